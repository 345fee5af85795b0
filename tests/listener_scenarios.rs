//! Broadcast behavior of the host-page Listener.

use std::time::Duration;

use serde_json::json;
use top_params::sim::Browser;
use top_params::{BroadcastTrigger, ListenerConfig, ReaderConfig};

const SITE: &str = "https://site.example.com";
const APP: &str = "https://apps.example.com";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn triggers(browser: &Browser) -> Vec<BroadcastTrigger> {
    browser.broadcasts().iter().map(|(_, r)| r.trigger).collect()
}

#[test]
fn test_extension_broadcasts_three_times_after_load() {
    init_logging();
    let mut browser = Browser::new(SITE, "?a=1");
    let top = browser.top();
    browser.install_listener(top, ListenerConfig::default()).unwrap();
    browser.add_frame(top, APP, "");

    browser.advance(Duration::from_millis(5000));

    assert_eq!(
        triggers(&browser),
        vec![
            BroadcastTrigger::Initial { index: 0 },
            BroadcastTrigger::Initial { index: 1 },
            BroadcastTrigger::Initial { index: 2 },
        ]
    );
    assert!(browser.broadcasts().iter().all(|(_, r)| r.delivered == 1));
}

#[test]
fn test_snippet_broadcasts_once_to_direct_frames() {
    init_logging();
    let mut browser = Browser::new(SITE, "?a=1");
    let top = browser.top();
    browser.install_listener(top, ListenerConfig::snippet()).unwrap();
    let direct = browser.add_frame(top, SITE, "");
    browser.add_frame(direct, SITE, "");

    browser.run_until_idle();

    assert_eq!(triggers(&browser), vec![BroadcastTrigger::Initial { index: 0 }]);
    let report = &browser.broadcasts()[0].1;
    assert_eq!(report.discovered, 1);
    assert_eq!(browser.now(), Duration::from_millis(500));
}

#[test]
fn test_extension_reaches_nested_same_origin_frames() {
    init_logging();
    let mut browser = Browser::new(SITE, "?a=1");
    let top = browser.top();
    browser.install_listener(top, ListenerConfig::default()).unwrap();
    let direct = browser.add_frame(top, SITE, "");
    let nested = browser.add_frame(direct, APP, "");
    browser.add_frame(nested, APP, "");

    browser.advance(Duration::from_millis(1000));

    // The cross-origin frame is reached but its own document is not searched.
    let report = &browser.broadcasts()[0].1;
    assert_eq!(report.discovered, 2);
    assert_eq!(report.delivered, 2);
    assert!(!report.truncated);
}

#[test]
fn test_deep_chain_is_bounded() {
    init_logging();
    let mut browser = Browser::new(SITE, "");
    let top = browser.top();
    browser.install_listener(top, ListenerConfig::default()).unwrap();
    let mut parent = top;
    for _ in 0..15 {
        parent = browser.add_frame(parent, SITE, "");
    }

    browser.advance(Duration::from_millis(1000));

    let report = &browser.broadcasts()[0].1;
    assert_eq!(report.discovered, 10);
    assert!(report.truncated);
}

#[test]
fn test_detached_frame_does_not_stop_broadcast() {
    init_logging();
    let mut browser = Browser::new(SITE, "?a=1");
    let top = browser.top();
    browser.install_listener(top, ListenerConfig::default()).unwrap();
    let frames: Vec<_> = (0..3).map(|_| browser.add_frame(top, APP, "")).collect();
    for frame in &frames {
        browser.install_reader(*frame, ReaderConfig::default(), "a");
    }
    browser.detach(frames[1]);

    browser.advance(Duration::from_millis(1000));

    let report = &browser.broadcasts()[0].1;
    assert_eq!(report.discovered, 3);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(browser.outputs(frames[0]).unwrap().parameter_value, "1");
    assert_eq!(browser.outputs(frames[2]).unwrap().parameter_value, "1");
}

#[test]
fn test_inserted_frames_share_one_debounced_broadcast() {
    init_logging();
    let mut browser = Browser::new(SITE, "?a=1");
    let top = browser.top();
    browser.install_listener(top, ListenerConfig::default()).unwrap();
    browser.advance(Duration::from_millis(6000));
    let before = browser.broadcasts().len();

    browser.insert_frame(top, APP, "");
    browser.advance(Duration::from_millis(100));
    browser.insert_frame(top, APP, "");
    browser.advance(Duration::from_millis(400));

    assert_eq!(browser.broadcasts().len(), before + 1);
    let (_, report) = browser.broadcasts().last().unwrap();
    assert_eq!(report.trigger, BroadcastTrigger::FrameInserted);
    assert_eq!(report.delivered, 2);

    browser.insert_frame(top, APP, "");
    browser.advance(Duration::from_millis(500));
    assert_eq!(browser.broadcasts().len(), before + 2);
}

#[test]
fn test_snippet_ignores_insertions_and_visibility() {
    init_logging();
    let mut browser = Browser::new(SITE, "?a=1");
    let top = browser.top();
    browser.install_listener(top, ListenerConfig::snippet()).unwrap();
    browser.run_until_idle();

    browser.insert_frame(top, APP, "");
    browser.set_hidden(top, true);
    browser.set_hidden(top, false);
    browser.run_until_idle();

    assert_eq!(browser.broadcasts().len(), 1);
}

#[test]
fn test_visible_page_rebroadcasts() {
    init_logging();
    let mut browser = Browser::new(SITE, "?a=1");
    let top = browser.top();
    browser.install_listener(top, ListenerConfig::default()).unwrap();
    browser.add_frame(top, APP, "");
    browser.run_until_idle();

    browser.set_hidden(top, true);
    assert_eq!(browser.broadcasts().len(), 3);
    browser.set_hidden(top, false);

    assert_eq!(
        triggers(&browser).last().copied(),
        Some(BroadcastTrigger::Visible)
    );
}

#[test]
fn test_malformed_messages_leave_listener_untouched() {
    init_logging();
    let mut browser = Browser::new(SITE, "?a=1");
    let top = browser.top();
    browser.install_listener(top, ListenerConfig::default()).unwrap();
    let frame = browser.add_frame(top, APP, "");

    browser.post_raw(frame, top, json!({ "foo": "bar" }));
    browser.post_raw(frame, top, serde_json::Value::Null);
    browser.post_raw(frame, top, json!({ "type": "urlParams", "params": {} }));
    browser.advance(Duration::ZERO);

    let listener = browser.listener(top).unwrap();
    assert_eq!(listener.requests_answered(), 0);
    assert!(listener.last_report().is_none());
}

#[test]
fn test_untagged_request_is_answered() {
    init_logging();
    let mut browser = Browser::new(SITE, "?a=1");
    let top = browser.top();
    browser.install_listener(top, ListenerConfig::default()).unwrap();
    let frame = browser.add_frame(top, APP, "");

    browser.post_raw(frame, top, json!({ "type": "requestUrlParams" }));
    browser.advance(Duration::ZERO);

    assert_eq!(browser.listener(top).unwrap().requests_answered(), 1);
    assert_eq!(browser.messages_delivered(), 2);
}

#[test]
fn test_reply_reaches_requester_origin() {
    init_logging();
    let mut browser = Browser::new(SITE, "?a=1");
    let top = browser.top();
    browser.install_listener(top, ListenerConfig::default()).unwrap();
    let frame = browser.add_frame(top, APP, "");
    browser.install_reader(frame, ReaderConfig::default(), "a");

    browser.advance(Duration::ZERO);

    assert_eq!(browser.messages_dropped(), 0);
    assert_eq!(browser.outputs(frame).unwrap().parameter_value, "1");
}

#[test]
fn test_disposed_listener_stops_everything() {
    init_logging();
    let mut browser = Browser::new(SITE, "?a=1");
    let top = browser.top();
    browser.install_listener(top, ListenerConfig::default()).unwrap();
    let frame = browser.add_frame(top, APP, "");
    browser.install_reader(frame, ReaderConfig::default(), "a");
    browser.dispose(top);

    browser.run_until_idle();

    assert!(browser.broadcasts().is_empty());
    assert_eq!(browser.listener(top).unwrap().requests_answered(), 0);
    assert!(!browser.outputs(frame).unwrap().error_message.is_empty());
}

#[test]
fn test_listener_config_from_customizer_properties() {
    init_logging();
    let config = ListenerConfig::from_json(r#"{ "enableLogging": false, "broadcastDelaysMs": [10] }"#)
        .unwrap();
    let mut browser = Browser::new(SITE, "?a=1");
    let top = browser.top();
    browser.install_listener(top, config).unwrap();
    browser.add_frame(top, APP, "");

    browser.run_until_idle();
    assert_eq!(browser.broadcasts().len(), 1);
    assert_eq!(browser.now(), Duration::from_millis(10));
}
