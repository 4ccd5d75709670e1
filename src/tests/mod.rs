
/// Route `log` output through the test harness; safe to call from every test.
pub(crate) fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
