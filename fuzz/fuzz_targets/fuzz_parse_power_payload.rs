#![no_main]
use libfuzzer_sys::fuzz_target;
use mqtt_pvinverter::mqtt::{TopicRouter, parse_power_payload};

fuzz_target!(|data: &[u8]| {
    // Accepted values must always be finite
    if let Ok(v) = parse_power_payload(data) {
        assert!(v.is_finite());
    }

    let router = TopicRouter::new("pv/l1/power", "pv/l2/power", "pv/l3/power");
    let _ = router.route("pv/l2/power", data);
});
