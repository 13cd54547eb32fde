#![no_main]

use ferrous_nest::router::{join_paths, RoutePattern};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    // First line is the template, the rest is the path to match
    let (template, path) = input.split_once('\n').unwrap_or((input, input));

    let joined = join_paths(&[template]);
    assert!(joined.starts_with('/'));
    assert!(!joined.contains("//"));

    if let Ok(pattern) = RoutePattern::parse(template) {
        // Reparsing the normalized template gives the same pattern
        let reparsed = RoutePattern::parse(pattern.template()).unwrap();
        assert_eq!(pattern, reparsed);

        if let Some(params) = pattern.matches(path) {
            for name in pattern.param_names() {
                assert!(params.contains_key(name));
            }
        }
        if pattern.is_static() {
            assert!(pattern.matches(pattern.template()).is_some());
        }
    }
});
