//! Diagnostics exports: telemetry JSON and the flight log.

use std::os::unix::io::{FromRawFd, OwnedFd};

use libc::c_int;
use vgate_layer::log::{self, vgate_dump_log, LogLevel};
use vgate_layer::{profile, vgate_get_telemetry, DISPATCH};

fn pipe() -> (OwnedFd, OwnedFd) {
    let mut fds = [0 as c_int; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
}

fn telemetry() -> serde_json::Value {
    let mut buf = [0 as libc::c_char; 2048];
    let n = unsafe { vgate_get_telemetry(buf.as_mut_ptr(), buf.len()) };
    assert!(n > 0);

    let bytes = unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, n as usize) };
    assert_eq!(buf[n as usize], 0);
    serde_json::from_slice(bytes).unwrap()
}

#[test]
fn test_telemetry_is_valid_json() {
    let value = telemetry();

    assert_eq!(value["pid"].as_u64(), Some(std::process::id() as u64));
    for key in ["bootstrap_level", "resolver", "log_level"] {
        assert!(value[key].is_string(), "missing {}", key);
    }
    assert!(value["passthrough"].is_boolean());
    assert!(value["debug"].is_boolean());
    assert!(value["log_bytes"].is_u64());
    assert!(value["profile"]["enabled"].is_boolean());
    assert!(value["profile"]["nested"].is_u64());

    // Nothing in this binary installs a resolver
    assert_eq!(value["passthrough"], serde_json::Value::Bool(true));
}

#[test]
fn test_profile_counts_dispatched_calls() {
    profile::set_enabled(true);
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    for _ in 0..3 {
        assert_eq!(unsafe { DISPATCH.stat(c"/".as_ptr(), &mut st) }, 0);
    }

    let value = telemetry();
    let section = &value["profile"];
    assert_eq!(section["enabled"], serde_json::Value::Bool(true));
    assert!(section["calls"]["stat"].as_u64().unwrap() >= 3);
    assert!(section["calls"]["open"].is_u64());
    let routed = section["direct"].as_u64().unwrap() + section["resolved"].as_u64().unwrap();
    assert!(routed >= 3);
}

#[test]
fn test_telemetry_rejects_small_or_null_buffer() {
    let mut small = [0 as libc::c_char; 8];
    assert_eq!(unsafe { vgate_get_telemetry(small.as_mut_ptr(), small.len()) }, -1);
    assert_eq!(unsafe { vgate_get_telemetry(std::ptr::null_mut(), 1024) }, -1);
    assert_eq!(unsafe { vgate_get_telemetry(small.as_mut_ptr(), 0) }, -1);
}

#[test]
fn test_dump_log_contains_warning() {
    log::set_level(LogLevel::Info);
    vgate_layer::vgate_warn!("telemetry check {}", 42);

    let (reader, writer) = pipe();
    let dumped = std::thread::scope(|s| {
        let collector = s.spawn(|| {
            let mut file = std::fs::File::from(reader);
            let mut out = Vec::new();
            std::io::Read::read_to_end(&mut file, &mut out).unwrap();
            out
        });
        let written = vgate_dump_log(std::os::unix::io::AsRawFd::as_raw_fd(&writer));
        assert!(written > 0);
        drop(writer);
        collector.join().unwrap()
    });

    let text = String::from_utf8_lossy(&dumped);
    assert!(text.contains("[WARN] telemetry check 42"), "log was: {}", text);
    assert!(text.contains(&format!("[VGATE][{}]", std::process::id())));
}
