use broadside::{init_logging, level_from};
use log::LevelFilter;

#[test]
fn test_level_parsing_falls_back_to_info() {
    assert_eq!(level_from(Some("debug")), LevelFilter::Debug);
    assert_eq!(level_from(Some("TRACE")), LevelFilter::Trace);
    assert_eq!(level_from(Some("off")), LevelFilter::Off);
    assert_eq!(level_from(Some("loud")), LevelFilter::Info);
    assert_eq!(level_from(None), LevelFilter::Info);
}

#[test]
fn test_init_is_idempotent() {
    init_logging();
    init_logging();
    log::info!("logger installed");
}
