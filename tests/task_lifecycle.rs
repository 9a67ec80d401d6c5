use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use neutrino_tau_bridge::native::{LoopbackBehavior, LoopbackNative, LoopbackStats};
use neutrino_tau_bridge::{
    NativeApi, NativeEngine, Point, Segment, SegmentNote, SynthesisData, SynthesisEvent,
    SynthesisResult, SynthesisTask, VoiceEngine,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn segment() -> Arc<dyn SynthesisData> {
    Arc::new(Segment::new(SegmentNote::chain(vec![
        SegmentNote::new(0.0, 0.05, 60, "ka"),
        SegmentNote::new(0.05, 0.1, 62, "sa"),
    ])))
}

fn task_for(loopback: &Arc<LoopbackNative>, data: Arc<dyn SynthesisData>) -> SynthesisTask {
    let api: Arc<dyn NativeApi> = loopback.clone();
    let engine = NativeEngine::create(Arc::clone(&api), Path::new("engine")).expect("engine");
    SynthesisTask::new(data, api, Some(Arc::new(engine)), "loopback")
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

fn wait_idle(task: &SynthesisTask) {
    wait_until("run to finish", || !task.is_running());
}

fn wait_in_native_call(loopback: &LoopbackNative, calls: usize) {
    wait_until("native call", || loopback.stats().synthesize_calls >= calls);
}

fn expect_complete(events: &Receiver<SynthesisEvent>) -> SynthesisResult {
    match events.recv_timeout(TIMEOUT) {
        Ok(SynthesisEvent::Progress(p)) => assert_eq!(p, 1.0),
        other => panic!("expected progress, got {other:?}"),
    }
    match events.recv_timeout(TIMEOUT) {
        Ok(SynthesisEvent::Complete(result)) => result,
        other => panic!("expected completion, got {other:?}"),
    }
}

fn expect_error(events: &Receiver<SynthesisEvent>) -> String {
    match events.recv_timeout(TIMEOUT) {
        Ok(SynthesisEvent::Error(message)) => message,
        other => panic!("expected error, got {other:?}"),
    }
}

fn assert_balanced(stats: &LoopbackStats) {
    assert_eq!(stats.leaked_strings(), 0, "{stats:?}");
    assert_eq!(stats.live_tokens(), 0, "{stats:?}");
    assert_eq!(stats.invalid_releases, 0, "{stats:?}");
}

#[test]
fn second_start_while_running_is_ignored() {
    let loopback = Arc::new(LoopbackNative::new().with_behavior(LoopbackBehavior::HoldUntilCancelled));
    let task = task_for(&loopback, segment());
    let events = task.subscribe();

    task.start();
    wait_in_native_call(&loopback, 1);
    task.start();
    assert!(task.is_running());
    assert_eq!(loopback.stats().tokens_created, vec![1]);

    task.stop();
    wait_idle(&task);

    let stats = loopback.stats();
    assert_eq!(stats.synthesize_calls, 1);
    assert_eq!(stats.tokens_cancelled, vec![1]);
    assert_balanced(&stats);
    assert!(events.try_recv().is_err());
}

#[test]
fn stop_then_start_never_cancels_the_new_token() {
    let loopback = Arc::new(LoopbackNative::new().with_behavior(LoopbackBehavior::HoldUntilCancelled));
    let task = task_for(&loopback, segment());
    let events = task.subscribe();

    task.start();
    wait_in_native_call(&loopback, 1);
    loopback.set_behavior(LoopbackBehavior::Render);
    task.stop();
    // May be a no-op if the cancelled run has not wound down yet.
    task.start();
    wait_idle(&task);

    task.start();
    wait_idle(&task);

    let stats = loopback.stats();
    assert_eq!(stats.tokens_cancelled, vec![1]);
    assert!(stats.tokens_created.len() >= 2);
    assert_balanced(&stats);

    let completions = events
        .try_iter()
        .filter(|event| matches!(event, SynthesisEvent::Complete(_)))
        .count();
    assert_eq!(completions, stats.tokens_created.len() - 1);
}

#[test]
fn native_buffers_balance_across_behaviors() {
    let behaviors = [
        LoopbackBehavior::Render,
        LoopbackBehavior::Fail("model missing".into()),
        LoopbackBehavior::FailSilently,
        LoopbackBehavior::Respond(String::new()),
        LoopbackBehavior::Respond("{not json".into()),
        LoopbackBehavior::Respond(r#"{"sampleRate":22050,"sampleCount":4}"#.into()),
        LoopbackBehavior::HoldUntilCancelled,
    ];

    let loopback = Arc::new(LoopbackNative::new());
    for round in 0..3 {
        for behavior in &behaviors {
            loopback.set_behavior(behavior.clone());
            let task = task_for(&loopback, segment());
            task.start();
            if round % 2 == 1 || *behavior == LoopbackBehavior::HoldUntilCancelled {
                task.stop();
            }
            wait_idle(&task);
        }
    }

    let stats = loopback.stats();
    assert_eq!(stats.tokens_created.len(), behaviors.len() * 3);
    assert_eq!(stats.engines_created, stats.engines_destroyed);
    assert_balanced(&stats);
}

#[test]
fn native_failures_surface_as_error_events() {
    let cases = [
        (
            LoopbackBehavior::Fail("model missing".into()),
            "Native synthesis failed: model missing",
        ),
        (
            LoopbackBehavior::FailSilently,
            "Native synthesis failed: Unknown native error",
        ),
        (
            LoopbackBehavior::Respond("  ".into()),
            "Native synthesis failed: Native synthesis response is empty.",
        ),
    ];

    for (behavior, expected) in cases {
        let loopback = Arc::new(LoopbackNative::new().with_behavior(behavior));
        let task = task_for(&loopback, segment());
        let events = task.subscribe();
        task.start();
        assert_eq!(expect_error(&events), expected);
        wait_idle(&task);
        assert!(events.try_recv().is_err());
        assert_balanced(&loopback.stats());
    }

    let loopback = Arc::new(LoopbackNative::new().with_behavior(LoopbackBehavior::Respond("{not json".into())));
    let task = task_for(&loopback, segment());
    let events = task.subscribe();
    task.start();
    assert!(expect_error(&events).starts_with("Native synthesis failed: "));
}

#[test]
fn missing_cancel_token_reports_error_without_running() {
    let loopback = Arc::new(LoopbackNative::new());
    loopback.set_refuse_tokens(true);
    let task = task_for(&loopback, segment());
    let events = task.subscribe();

    task.start();
    assert_eq!(expect_error(&events), "Failed to create native cancel token.");
    assert!(!task.is_running());
    assert_eq!(loopback.stats().synthesize_calls, 0);

    loopback.set_refuse_tokens(false);
    task.start();
    expect_complete(&events);
}

#[test]
fn success_delivered_after_stop_is_dropped() {
    let loopback = Arc::new(LoopbackNative::new().with_behavior(LoopbackBehavior::RenderAfterCancel));
    let task = task_for(&loopback, segment());
    let events = task.subscribe();

    task.start();
    wait_in_native_call(&loopback, 1);
    task.stop();
    wait_idle(&task);

    assert!(events.try_recv().is_err());
    let stats = loopback.stats();
    assert_eq!(stats.strings_allocated, 1);
    assert_eq!(stats.strings_freed, 1);
    assert_eq!(stats.tokens_cancelled, vec![1]);
    assert_balanced(&stats);
}

#[test]
fn restart_succeeds_once_the_previous_run_has_exited() {
    let loopback = Arc::new(LoopbackNative::new());
    let task = task_for(&loopback, segment());
    let events = task.subscribe();

    for _ in 0..5 {
        task.start();
        expect_complete(&events);
        wait_idle(&task);
    }
    assert_eq!(loopback.stats().synthesize_calls, 5);
    assert_balanced(&loopback.stats());
}

#[test]
fn set_dirty_cancels_like_stop() {
    let loopback = Arc::new(LoopbackNative::new().with_behavior(LoopbackBehavior::HoldUntilCancelled));
    let task = task_for(&loopback, segment());
    let events = task.subscribe();

    task.start();
    wait_in_native_call(&loopback, 1);
    task.set_dirty("note moved");
    wait_idle(&task);

    assert!(events.try_recv().is_err());
    assert_eq!(loopback.stats().tokens_cancelled, vec![1]);
    assert_balanced(&loopback.stats());
}

#[test]
fn suspend_and_resume_do_not_disturb_a_run() {
    let loopback = Arc::new(LoopbackNative::new());
    let task = task_for(&loopback, segment());
    let events = task.subscribe();

    task.suspend();
    task.start();
    task.resume();
    expect_complete(&events);
}

#[test]
fn response_is_mapped_back_onto_snapshot_notes() {
    let response = r#"{
        "startTime": 0.0,
        "sampleRate": 44100,
        "sampleCount": 3,
        "samples": [0.1, 0.2, 0.3],
        "pitchTimes": [0, 1, 2],
        "pitchValues": [100, "NaN", 102],
        "notePhonemes": [
            {"noteIndex": 0, "phonemes": [
                {"symbol": "a", "startTime": 0, "endTime": 1},
                {"symbol": " ", "startTime": 1, "endTime": 2}
            ]},
            {"noteIndex": 5, "phonemes": [{"symbol": "x", "startTime": 0, "endTime": 1}]}
        ]
    }"#;
    let loopback = Arc::new(LoopbackNative::new().with_behavior(LoopbackBehavior::Respond(response.into())));
    let task = task_for(
        &loopback,
        Arc::new(Segment::new(SegmentNote::chain(vec![SegmentNote::new(0.0, 2.0, 60, "a")]))),
    );
    let events = task.subscribe();
    task.start();

    let result = expect_complete(&events);
    assert_eq!(result.sample_rate, 44_100);
    assert_eq!(result.samples, vec![0.1, 0.2, 0.3]);
    assert_eq!(
        result.synthesized_pitch,
        vec![vec![Point::new(0.0, 100.0), Point::new(2.0, 102.0)]]
    );
    assert_eq!(result.synthesized_phonemes.len(), 1);
    let phonemes = result
        .synthesized_phonemes
        .get(&task.snapshot().notes()[0])
        .expect("first note");
    assert_eq!(phonemes.len(), 1);
    assert_eq!(phonemes[0].symbol, "a");
    assert_eq!((phonemes[0].start_time, phonemes[0].end_time), (0.0, 1.0));
}

#[test]
fn empty_sample_buffer_becomes_silence() {
    let loopback = Arc::new(LoopbackNative::new().with_behavior(LoopbackBehavior::Respond(
        r#"{"startTime":0.5,"sampleRate":22050,"sampleCount":4}"#.into(),
    )));
    let task = task_for(&loopback, segment());
    let events = task.subscribe();
    task.start();

    let result = expect_complete(&events);
    assert_eq!(result.start_time, 0.5);
    assert_eq!(result.sample_rate, 22_050);
    assert_eq!(result.samples, vec![0.0; 4]);
    assert!(result.synthesized_pitch.is_empty());
    assert!(result.synthesized_phonemes.is_empty());
}

#[test]
fn voice_engine_runs_a_task_end_to_end() {
    let loopback = Arc::new(LoopbackNative::new());
    let mut engine = VoiceEngine::new(loopback.clone());
    engine.init(Path::new("/opt/neutrino")).expect("init");

    let voice = engine.create_voice_source("loopback");
    assert_eq!(voice.name(), "loopback");
    let task = voice.create_synthesis_task(segment());
    assert_eq!(task.voice_id(), "loopback");
    let events = task.subscribe();

    engine.destroy();
    task.start();
    let result = expect_complete(&events);
    assert_eq!(result.sample_rate, 44_100);
    assert_eq!(result.synthesized_phonemes.len(), 2);

    wait_idle(&task);
    drop(task);
    drop(voice);
    let stats = loopback.stats();
    assert_eq!(stats.engines_created, 1);
    assert_eq!(stats.engines_destroyed, 1);
    assert_balanced(&stats);
}
