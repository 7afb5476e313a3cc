fn main() {
    dotenvy::from_filename(".env.local").ok();
    dotenvy::dotenv().ok();
    kline_sync::app::logging::init();
    if let Err(err) = kline_sync::app::cli::run() {
        eprintln!("error: {}", err.message);
        std::process::exit(1);
    }
}
