//! Whole-session tests for the line protocol, driven over in-memory streams.

use std::sync::Arc;

use bench_server::engine::alloc::CountingAllocator;
use bench_server::line::{run_session, SessionEnd};
use bench_server::{
    Bencher, BenchmarkEntry, ControlState, Coordinator, MeasuredEngine, Options, Registry,
};
use tokio::io::BufReader;

// Installed so runs that request memory statistics report real figures.
#[global_allocator]
static ALLOCATOR: CountingAllocator = CountingAllocator;

fn spin(b: &mut Bencher) {
    b.iter(|| std::hint::black_box(1u64).wrapping_mul(3));
}

fn churn(b: &mut Bencher) {
    b.report_allocs();
    b.iter(|| vec![0u8; 256]);
}

fn boom(_b: &mut Bencher) {
    panic!("boom");
}

fn leaky(b: &mut Bencher) {
    b.set_parallelism(9);
    b.iter(|| ());
}

fn test_state() -> ControlState {
    let registry = Registry::build(vec![
        BenchmarkEntry::new("spin", spin),
        BenchmarkEntry::new("churn", churn),
        BenchmarkEntry::new("boom", boom),
        BenchmarkEntry::new("leaky", leaky),
    ])
    .unwrap();
    ControlState::new(
        registry,
        Coordinator::new(Arc::new(MeasuredEngine), None),
        Options::default(),
    )
}

/// Run a scripted session and return (end, stdout, stderr).
async fn session(script: &str) -> (SessionEnd, String, String) {
    let mut state = test_state();
    let input = BufReader::new(script.as_bytes());
    let mut output = Vec::new();
    let mut errors = Vec::new();

    let end = run_session(&mut state, input, &mut output, &mut errors)
        .await
        .expect("session I/O");
    (
        end,
        String::from_utf8(output).unwrap(),
        String::from_utf8(errors).unwrap(),
    )
}

#[tokio::test]
async fn list_prints_sorted_names_and_a_terminating_blank_line() {
    let (end, out, _err) = session("list\nquit\n").await;
    assert_eq!(end, SessionEnd::Quit);
    assert_eq!(out, "boom\nchurn\nleaky\nspin\n\n");
}

#[tokio::test]
async fn list_is_idempotent() {
    let (_end, out, _err) = session("list\nlist\nquit\n").await;
    let expected = "boom\nchurn\nleaky\nspin\n\n";
    assert_eq!(out, format!("{}{}", expected, expected));
}

#[tokio::test]
async fn run_reports_requested_iterations_under_the_bare_name() {
    let (_end, out, err) = session("run spin 50\nquit\n").await;
    assert!(
        out.starts_with("spin\t50\t"),
        "unexpected report line: {:?}",
        out
    );
    assert!(out.contains(" ns/op"));
    // No memory stats unless asked for.
    assert!(!out.contains("allocs/op"));
    assert!(err.is_empty(), "unexpected stderr: {:?}", err);
}

#[tokio::test]
async fn run_with_suffix_uses_the_suffixed_display_name() {
    let (_end, out, _err) = session("run spin-3 10\nquit\n").await;
    assert!(
        out.starts_with("spin-3\t10\t"),
        "unexpected report line: {:?}",
        out
    );
}

#[tokio::test]
async fn body_requested_memory_stats_appear_without_benchmem() {
    let (_end, out, _err) = session("run churn 20\nquit\n").await;
    assert!(out.contains("allocs/op"), "missing memory stats: {:?}", out);
    assert!(out.contains("B/op"));
}

#[tokio::test]
async fn benchmem_forces_memory_stats_and_turning_it_off_stops() {
    let (_end, out, _err) = session(
        "set benchmem true\nrun spin 10\nset benchmem false\nrun spin 10\nquit\n",
    )
    .await;
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("allocs/op"), "first run: {:?}", lines[0]);
    assert!(!lines[1].contains("allocs/op"), "second run: {:?}", lines[1]);
}

#[tokio::test]
async fn unknown_name_reports_not_found_and_nothing_runs() {
    let (_end, out, err) = session("run missing 10\nquit\n").await;
    assert!(out.is_empty(), "unexpected stdout: {:?}", out);
    assert!(err.contains("missing not found"), "stderr: {:?}", err);
}

#[tokio::test]
async fn failed_run_prints_a_fail_notice_and_the_session_continues() {
    let (_end, out, err) = session("run boom 5\nrun spin 5\nquit\n").await;
    assert!(err.contains("--- FAIL: boom"), "stderr: {:?}", err);
    // Server kept serving after the failure.
    assert!(out.starts_with("spin\t5\t"), "stdout: {:?}", out);
}

#[tokio::test]
async fn leak_warns_on_stderr_but_keeps_the_result() {
    let (_end, out, err) = session("run leaky 5\nquit\n").await;
    assert!(out.starts_with("leaky\t5\t"), "stdout: {:?}", out);
    assert!(
        err.contains("leaky left parallelism set to 9"),
        "stderr: {:?}",
        err
    );
}

#[tokio::test]
async fn unknown_and_empty_input_print_help_and_change_nothing() {
    let (_end, out, err) = session("\nwat\nrun spin 5\nquit\n").await;
    // Help twice, once for the blank line and once for the unknown word.
    assert_eq!(err.matches("commands:").count(), 2);
    // State is intact: a normal run still works with default options.
    assert!(out.starts_with("spin\t5\t"));
    assert!(!out.contains("allocs/op"));
}

#[tokio::test]
async fn malformed_run_arguments_report_specific_errors() {
    let (_end, out, err) = session("run spin\nrun spin ten\nrun spin 0\nquit\n").await;
    assert!(out.is_empty());
    assert!(err.contains("usage: run"), "stderr: {:?}", err);
    assert!(err.contains("bad iteration count \"ten\""));
    assert!(err.contains("bad iteration count \"0\""));
}

#[tokio::test]
async fn malformed_set_leaves_options_unchanged() {
    let (_end, out, err) = session("set benchmem maybe\nrun spin 5\nquit\n").await;
    assert!(err.contains("bad bool value \"maybe\""));
    assert!(!out.contains("allocs/op"), "options changed: {:?}", out);
}

#[tokio::test]
async fn end_of_input_is_a_clean_end() {
    let (end, _out, _err) = session("list\n").await;
    assert_eq!(end, SessionEnd::Eof);
}

#[tokio::test]
async fn exit_is_a_synonym_for_quit() {
    let (end, _out, _err) = session("exit\n").await;
    assert_eq!(end, SessionEnd::Quit);
}
