use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// 全域並行額度：限制同時進行的轉檔數量
#[derive(Debug)]
pub struct ConcurrencyBudget {
    capacity: usize,
    available: Mutex<usize>,
    released: Condvar,
}

/// 取得的額度，drop 時自動歸還（包含 panic 展開時）
#[derive(Debug)]
pub struct BudgetPermit<'a> {
    budget: &'a ConcurrencyBudget,
}

impl ConcurrencyBudget {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            available: Mutex::new(capacity),
            released: Condvar::new(),
        }
    }

    /// 取得一個額度，額度用盡時阻塞
    pub fn acquire(&self) -> BudgetPermit<'_> {
        let mut available = self.lock();
        while *available == 0 {
            available = self
                .released
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *available -= 1;
        BudgetPermit { budget: self }
    }

    #[cfg(test)]
    pub fn try_acquire(&self) -> Option<BudgetPermit<'_>> {
        let mut available = self.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(BudgetPermit { budget: self })
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn available(&self) -> usize {
        *self.lock()
    }

    fn release(&self) {
        *self.lock() += 1;
        self.released.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.available.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for BudgetPermit<'_> {
    fn drop(&mut self) {
        self.budget.release();
    }
}
