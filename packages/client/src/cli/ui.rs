//! UI utilities for the terminal client.

use std::io::Write;

/// Redisplay the prompt after printing asynchronous output
pub fn redisplay_prompt(user_id: &str) {
    print!("{}> ", user_id);
    std::io::stdout().flush().ok();
}
