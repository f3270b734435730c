use anyhow::Result;
use log::{error, info};
use upload_image_converter::component::ImageConverter;
use upload_image_converter::config::Config;
use upload_image_converter::init;
use upload_image_converter::signal::setup_shutdown_signal;

fn main() -> Result<()> {
    let config = Config::new()?;
    init::init(config.debug);
    if config.debug {
        config.print_configuration();
    }

    let shutdown_signal = setup_shutdown_signal()?;
    let converter = ImageConverter::with_defaults(config)?;

    if let Err(e) = converter.run(&shutdown_signal) {
        error!("服務異常結束: {e:#}");
        return Err(e);
    }

    info!("Program exited normally");
    Ok(())
}
