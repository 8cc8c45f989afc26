use std::io::IsTerminal;

pub fn trace_init() {
    let color = std::io::stdout().is_terminal();
    let level = std::env::var("TEST_LOG").unwrap_or_else(|_| "debug".to_string());

    tally::trace::init(color, false, &level);
}
