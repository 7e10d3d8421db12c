#![no_main]

use libfuzzer_sys::fuzz_target;
use plexus_core::PathRegistry;
use plexus_graph::{DependencyGraph, ResolvedCallback, resolve_from_outputs};
use serde_json::json;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as a dependencies payload. Parsing may fail, building
    // must not panic, and every accepted callback must resolve cleanly.
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(graph) = DependencyGraph::from_json_str(text) else {
        return;
    };

    let layout = json!({"type": "Div", "props": {"id": "root", "children": [
        {"type": "Input", "props": {"id": "a", "value": 1}},
        {"type": "Input", "props": {"id": {"type": "row", "index": 0}, "value": 1}},
        {"type": "Input", "props": {"id": {"type": "row", "index": 1}, "value": 2}}
    ]}});
    let paths = PathRegistry::from_layout(&layout);
    for spec in graph.callbacks() {
        for resolved in resolve_from_outputs(spec, &paths, None) {
            let _ = resolved.output_keys(&paths);
            let _ = resolved.input_keys(&paths);
            let _ = resolved.is_complete(&paths);
        }
        let _ = ResolvedCallback::new(spec.clone(), None).resolved_id().len();
    }
});
