use serde_json::{json, Value};
use std::sync::{mpsc, Arc, Barrier, Mutex, MutexGuard};
use tapedeck::replay::session::{enter_state, exit_state, SessionToken};
use tapedeck::{
    current_state, start_playback, start_recording, CapturedCall, Cassette, InterceptionSpec,
    SessionMode, Target, TapedeckError,
};

// Every test here reads the process-wide registry, so they run one at a time.
static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    match SERIAL.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn echo(id: &str) -> Arc<Target> {
    Target::new(id, |args: Vec<Value>| Ok(Value::Array(args)))
}

fn tape(target: &str) -> Cassette {
    Cassette::new(
        vec![CapturedCall {
            target_id: target.to_string(),
            arg_key: json!([]),
            return_value: json!("taped"),
        }],
        0,
    )
}

#[test]
fn mode_is_visible_inside_each_session_and_cleared_after() {
    let _serial = serial();
    assert_eq!(current_state().expect("idle"), None);

    let (mode, _) = start_recording(
        [InterceptionSpec::for_target(echo("state::rec"))],
        current_state,
        None,
    )
    .expect("record");
    assert_eq!(mode, Some(SessionMode::Recording));

    let mode = start_playback(
        [InterceptionSpec::for_target(echo("state::play"))],
        &tape("state::play"),
        current_state,
    )
    .expect("playback");
    assert_eq!(mode, Some(SessionMode::Replaying));

    assert_eq!(current_state().expect("idle"), None);
}

#[test]
fn overlapping_record_and_playback_make_the_mode_ambiguous() {
    let _serial = serial();
    let inside = Arc::new(Barrier::new(3));
    let release = Arc::new(Barrier::new(3));

    let recorder = {
        let (inside, release) = (inside.clone(), release.clone());
        std::thread::spawn(move || {
            start_recording(
                [InterceptionSpec::for_target(echo("overlap::rec"))],
                move || {
                    inside.wait();
                    release.wait();
                    Ok(())
                },
                None,
            )
            .map(|(result, _)| result)
        })
    };
    let player = {
        let (inside, release) = (inside.clone(), release.clone());
        std::thread::spawn(move || {
            start_playback(
                [InterceptionSpec::for_target(echo("overlap::play"))],
                &tape("overlap::play"),
                move || {
                    inside.wait();
                    release.wait();
                    Ok(())
                },
            )
        })
    };

    inside.wait();
    let observed = current_state();
    release.wait();

    recorder.join().expect("join recorder").expect("recording ok");
    player.join().expect("join player").expect("playback ok");
    assert!(matches!(
        observed,
        Err(TapedeckError::AmbiguousSessionState { .. })
    ));
    assert_eq!(current_state().expect("idle again"), None);
}

#[test]
fn overlapping_recordings_are_not_ambiguous() {
    let _serial = serial();
    let inside = Arc::new(Barrier::new(3));
    let release = Arc::new(Barrier::new(3));
    let (tx, rx) = mpsc::channel();

    let workers: Vec<_> = (0..2)
        .map(|n| {
            let (inside, release, tx) = (inside.clone(), release.clone(), tx.clone());
            std::thread::spawn(move || {
                let target = echo(&format!("parallel::rec-{n}"));
                let t = target.clone();
                start_recording(
                    [InterceptionSpec::for_target(target)],
                    move || {
                        let value = t.call(vec![json!(n)])?;
                        inside.wait();
                        release.wait();
                        Ok(value)
                    },
                    None,
                )
                .map(|(_, cassette)| {
                    let _ = tx.send(cassette.calls.len());
                })
            })
        })
        .collect();

    inside.wait();
    let observed = current_state().expect("same-mode sessions are fine");
    release.wait();
    for worker in workers {
        worker.join().expect("join").expect("record");
    }
    drop(tx);

    assert_eq!(observed, Some(SessionMode::Recording));
    assert_eq!(rx.iter().collect::<Vec<_>>(), vec![1, 1]);
}

#[test]
fn explicit_registration_on_the_global_registry() {
    let _serial = serial();
    let rec = SessionToken::next();
    let play = SessionToken::next();
    enter_state(rec, SessionMode::Recording);
    enter_state(play, SessionMode::Replaying);
    assert!(current_state().is_err());
    exit_state(play);
    assert_eq!(current_state().expect("one mode"), Some(SessionMode::Recording));
    exit_state(rec);
    assert_eq!(current_state().expect("idle"), None);
}

#[test]
fn failed_playback_deregisters_its_session() {
    let _serial = serial();
    let target = echo("state::exhausted");
    let t = target.clone();
    let err = start_playback(
        [InterceptionSpec::for_target(target)],
        &Cassette::new(Vec::new(), 0),
        move || t.call(vec![]),
    )
    .expect_err("exhausted");
    assert!(matches!(err, TapedeckError::ExhaustedCassette { .. }));
    assert_eq!(current_state().expect("idle"), None);
}

#[test]
fn sessions_on_one_target_may_end_out_of_order() {
    let _serial = serial();
    let target = Target::new("shared::f", |_args: Vec<Value>| Ok(json!("real")));
    let play_in = Arc::new(Barrier::new(2));
    let play_out = Arc::new(Barrier::new(2));
    let rec_in = Arc::new(Barrier::new(2));
    let rec_out = Arc::new(Barrier::new(2));

    let player = {
        let (target, entered, release) = (target.clone(), play_in.clone(), play_out.clone());
        std::thread::spawn(move || {
            let t = target.clone();
            start_playback(
                [InterceptionSpec::for_target(target)],
                &tape("shared::f"),
                move || {
                    let value = t.call(vec![])?;
                    entered.wait();
                    release.wait();
                    Ok(value)
                },
            )
        })
    };
    play_in.wait();

    let recorder = {
        let (target, entered, release) = (target.clone(), rec_in.clone(), rec_out.clone());
        std::thread::spawn(move || {
            start_recording(
                [InterceptionSpec::for_target(target)],
                move || {
                    entered.wait();
                    release.wait();
                    Ok(())
                },
                None,
            )
        })
    };
    rec_in.wait();

    // Playback started first and ends first.
    play_out.wait();
    let replayed = player.join().expect("join player").expect("playback ok");
    assert_eq!(replayed, json!("taped"));

    // Only the recording layer is left, wrapping the real implementation.
    assert_eq!(target.call(vec![json!(1)]).expect("recorded call"), json!("real"));

    rec_out.wait();
    let (_, cassette) = recorder.join().expect("join recorder").expect("recording ok");
    assert_eq!(cassette.calls.len(), 1);
    assert_eq!(cassette.calls[0].return_value, json!("real"));

    assert_eq!(target.call(vec![]).expect("original"), json!("real"));
    assert_eq!(target.current().meta().name, "shared::f");
    assert_eq!(current_state().expect("idle"), None);
}
