use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// 去重佇列：同一個 key 從被接受到被取出之間只會存在一份
///
/// 成員集合與等待序列放在同一把鎖之下，接受與取出都是原子操作，
/// 不會出現「在集合中但不在序列中」或「序列中出現兩次」的狀態。
/// 佇列長度沒有上限，節流由處理端的並行額度負責。
#[derive(Debug)]
pub struct DedupQueue<K> {
    state: Mutex<QueueState<K>>,
    available: Condvar,
}

#[derive(Debug)]
struct QueueState<K> {
    pending: VecDeque<K>,
    members: HashSet<K>,
    completed: bool,
}

impl<K> DedupQueue<K>
where
    K: Eq + Hash + Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                members: HashSet::new(),
                completed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// 嘗試加入 key，已在佇列中或佇列已完成時回傳 false
    pub fn try_admit(&self, key: K) -> bool {
        let mut state = self.lock();
        if state.completed || state.members.contains(&key) {
            return false;
        }
        state.members.insert(key.clone());
        state.pending.push_back(key);
        drop(state);

        self.available.notify_one();
        true
    }

    /// 依加入順序取出下一個 key，佇列為空時阻塞
    ///
    /// 取出的同時移除成員資格，因此同一個 key 可以立即再次加入。
    /// 佇列已完成且清空後回傳 `None`。
    pub fn take(&self) -> Option<K> {
        let mut state = self.lock();
        loop {
            if let Some(key) = state.pending.pop_front() {
                state.members.remove(&key);
                return Some(key);
            }
            if state.completed {
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// 不阻塞的取出
    pub fn try_take(&self) -> Option<K> {
        let mut state = self.lock();
        let key = state.pending.pop_front()?;
        state.members.remove(&key);
        Some(key)
    }

    /// 標記不再接受新的 key，並喚醒所有等待中的消費者
    pub fn complete(&self) {
        self.lock().completed = true;
        self.available.notify_all();
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.lock().completed
    }

    #[cfg(test)]
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.lock().members.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    // 臨界區內沒有會 panic 的操作，中毒時的狀態仍然一致
    fn lock(&self) -> MutexGuard<'_, QueueState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K> Default for DedupQueue<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
