#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parsing must never panic, and any accepted query must plan cleanly
    if let Ok(query) = csvdex::query::parse_query(data) {
        let fields = vec!["id".to_string(), "name".to_string()];
        let _ = csvdex::query::QueryPlan::from_query(&query, &fields);
    }
});
