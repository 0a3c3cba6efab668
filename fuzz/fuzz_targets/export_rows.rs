#![no_main]

use libfuzzer_sys::fuzz_target;
use taskblame::ingest::{match_task_row, parse_action_row, parse_step_row, split_quoted};

fuzz_target!(|data: &[u8]| {
    // Export files are decoded lossily, so every byte string is a valid row
    let line = String::from_utf8_lossy(data);

    // None of the row parsers may panic, whatever the input
    let _ = split_quoted(&line);
    let _ = match_task_row(&line, "plan");
    let _ = parse_step_row(&line, "plan");
    let _ = parse_action_row(&line, "plan");
});
