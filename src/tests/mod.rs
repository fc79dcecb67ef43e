mod test_embedding;
mod test_helpers;
mod test_optimizer;
mod test_reduction;
mod test_selector;

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}
