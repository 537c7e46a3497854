use crossbeam_channel::Receiver;
use macrocorder_core::{Action, ActionKind, BackendFactory, Button, Error, InputBackend, Result};
use macrocorder_recorder::{PlayOptions, PlaybackEvent, Player};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Move(f64, f64),
    Down(Button),
    Up(Button),
    KeyDown(String),
    KeyUp(String),
}

/// Records every synthesized call; the key "bogus" is rejected
#[derive(Clone, Default)]
struct Recording(Arc<Mutex<Vec<Call>>>);

impl Recording {
    fn calls(&self) -> Vec<Call> {
        self.0.lock().clone()
    }

    fn factory(&self) -> BackendFactory {
        let rec = self.clone();
        Arc::new(move || Ok(Box::new(rec.clone()) as Box<dyn InputBackend>))
    }
}

impl InputBackend for Recording {
    fn move_to(&mut self, x: f64, y: f64) -> Result<()> {
        self.0.lock().push(Call::Move(x, y));
        Ok(())
    }
    fn button_down(&mut self, button: Button) -> Result<()> {
        self.0.lock().push(Call::Down(button));
        Ok(())
    }
    fn button_up(&mut self, button: Button) -> Result<()> {
        self.0.lock().push(Call::Up(button));
        Ok(())
    }
    fn key_down(&mut self, key: &str) -> Result<()> {
        if key == "bogus" {
            return Err(Error::invalid_key(key));
        }
        self.0.lock().push(Call::KeyDown(key.to_string()));
        Ok(())
    }
    fn key_up(&mut self, key: &str) -> Result<()> {
        self.0.lock().push(Call::KeyUp(key.to_string()));
        Ok(())
    }
}

fn click(x: f64, y: f64) -> Action {
    Action::new(ActionKind::Click {
        button: Button::Left,
        x,
        y,
        duration: 0.05,
        screen: "Main".into(),
    })
}

fn key(k: &str) -> Action {
    Action::new(ActionKind::Key { key: k.into(), duration: 0.1 })
}

fn straight_move(points: usize, duration: f64) -> Action {
    Action::new(ActionKind::Move {
        path: (0..points).map(|i| (i as f64, 0.0)).collect(),
        duration,
        screen: "Main".into(),
    })
}

/// Wall time from `play_events` to `Done`
fn timed_run(player: &Player, actions: Vec<Action>, opts: PlayOptions) -> Duration {
    let started = Instant::now();
    let rx = player.play_events(actions, opts).unwrap();
    collect_steps(&rx);
    started.elapsed()
}

/// Step indices until `Done`
fn collect_steps(rx: &Receiver<PlaybackEvent>) -> Vec<usize> {
    let mut steps = Vec::new();
    loop {
        match rx.recv_timeout(Duration::from_secs(5)).expect("playback event") {
            PlaybackEvent::Step { index, .. } => steps.push(index),
            PlaybackEvent::Done => return steps,
        }
    }
}

#[test]
fn click_and_key_are_synthesized_in_order() {
    let backend = Recording::default();
    let player = Player::new(backend.factory());

    let rx = player
        .play_events(vec![click(5.0, 6.0), key("a")], PlayOptions::default())
        .unwrap();
    assert_eq!(collect_steps(&rx), [0, 1]);
    assert_eq!(
        backend.calls(),
        [
            Call::Move(5.0, 6.0),
            Call::Down(Button::Left),
            Call::Up(Button::Left),
            Call::KeyDown("a".into()),
            Call::KeyUp("a".into()),
        ]
    );
}

#[test]
fn move_path_hits_both_endpoints() {
    let backend = Recording::default();
    let player = Player::new(backend.factory());
    let path = vec![(0.0, 0.0), (10.0, 0.0), (20.0, 0.0), (30.0, 0.0)];
    let action = Action::new(ActionKind::Move {
        path,
        duration: 0.03,
        screen: "Main".into(),
    });

    let rx = player.play_events(vec![action], PlayOptions::default()).unwrap();
    collect_steps(&rx);

    let calls = backend.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls.first(), Some(&Call::Move(0.0, 0.0)));
    assert_eq!(calls.last(), Some(&Call::Move(30.0, 0.0)));
}

#[test]
fn drag_presses_moves_and_releases() {
    let backend = Recording::default();
    let player = Player::new(backend.factory());
    let action = Action::new(ActionKind::Drag {
        button: Button::Right,
        path: vec![(0.0, 0.0), (5.0, 5.0), (10.0, 10.0)],
        duration: 0.02,
        screen: "Main".into(),
    });

    let rx = player.play_events(vec![action], PlayOptions::default()).unwrap();
    collect_steps(&rx);

    let calls = backend.calls();
    assert_eq!(calls[0], Call::Move(0.0, 0.0));
    assert_eq!(calls[1], Call::Down(Button::Right));
    assert_eq!(calls.last(), Some(&Call::Up(Button::Right)));
    assert!(calls.contains(&Call::Move(10.0, 10.0)));
}

#[test]
fn repeat_runs_every_pass() {
    let backend = Recording::default();
    let player = Player::new(backend.factory());
    let opts = PlayOptions {
        repeat: 3,
        ..PlayOptions::default()
    };

    let rx = player.play_events(vec![key("x"), key("y")], opts).unwrap();
    assert_eq!(collect_steps(&rx), [0, 1, 0, 1, 0, 1]);
    assert_eq!(backend.calls().len(), 12);
}

#[test]
fn start_offset_applies_to_first_pass_only() {
    let backend = Recording::default();
    let player = Player::new(backend.factory());
    let opts = PlayOptions {
        repeat: 2,
        start_offset: 2,
        ..PlayOptions::default()
    };

    let rx = player
        .play_events(vec![key("a"), key("b"), key("c")], opts)
        .unwrap();
    assert_eq!(collect_steps(&rx), [2, 0, 1, 2]);
}

#[test]
fn offset_past_the_end_skips_the_first_pass() {
    let backend = Recording::default();
    let player = Player::new(backend.factory());
    let opts = PlayOptions {
        repeat: 2,
        start_offset: 10,
        ..PlayOptions::default()
    };

    let rx = player.play_events(vec![key("a"), key("b")], opts).unwrap();
    assert_eq!(collect_steps(&rx), [0, 1]);
}

#[test]
fn failing_step_does_not_abort_the_session() {
    let backend = Recording::default();
    let player = Player::new(backend.factory());

    let rx = player
        .play_events(vec![key("bogus"), click(1.0, 2.0)], PlayOptions::default())
        .unwrap();
    assert_eq!(collect_steps(&rx), [0, 1]);
    assert!(backend.calls().contains(&Call::Down(Button::Left)));
}

#[test]
fn endless_loop_stops_on_request() {
    let backend = Recording::default();
    let player = Player::new(backend.factory());
    let opts = PlayOptions {
        repeat: 0,
        ..PlayOptions::default()
    };

    let rx = player.play_events(vec![key("z")], opts).unwrap();
    for _ in 0..3 {
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            PlaybackEvent::Step { index, .. } => assert_eq!(index, 0),
            PlaybackEvent::Done => panic!("loop ended on its own"),
        }
    }
    assert!(player.is_playing());

    player.stop();
    assert!(!player.is_playing());
    let rest: Vec<_> = rx.try_iter().collect();
    assert_eq!(rest.last(), Some(&PlaybackEvent::Done));
    assert_eq!(rest.iter().filter(|e| **e == PlaybackEvent::Done).count(), 1);
}

#[test]
fn stopping_mid_drag_releases_the_button() {
    let backend = Recording::default();
    let player = Player::new(backend.factory());
    let path: Vec<_> = (0..50).map(|i| (i as f64, 0.0)).collect();
    let action = Action::new(ActionKind::Drag {
        button: Button::Left,
        path,
        duration: 30.0,
        screen: "Main".into(),
    });

    let rx = player.play_events(vec![action], PlayOptions::default()).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    player.stop();

    assert_eq!(collect_steps(&rx), [0]);
    let calls = backend.calls();
    assert!(calls.contains(&Call::Down(Button::Left)));
    assert_eq!(calls.last(), Some(&Call::Up(Button::Left)));
    assert!(!calls.contains(&Call::Move(49.0, 0.0)));
}

#[test]
fn invalid_speed_is_rejected_and_reports_done() {
    let backend = Recording::default();
    let player = Player::new(backend.factory());
    let done = Arc::new(AtomicUsize::new(0));

    for speed in [0.0, -1.0, f64::NAN] {
        let done = done.clone();
        let opts = PlayOptions {
            speed,
            ..PlayOptions::default()
        };
        let result = player.play(vec![key("a")], opts, |_, _| {}, move || {
            done.fetch_add(1, Ordering::SeqCst);
        });
        assert!(result.is_err());
    }

    assert_eq!(done.load(Ordering::SeqCst), 3);
    assert!(!player.is_playing());
    assert!(backend.calls().is_empty());
}

#[test]
fn empty_list_finishes_immediately() {
    let backend = Recording::default();
    let player = Player::new(backend.factory());

    let rx = player.play_events(Vec::new(), PlayOptions::default()).unwrap();
    assert!(collect_steps(&rx).is_empty());
}

#[test]
fn unavailable_backend_ends_the_session() {
    let factory: BackendFactory = Arc::new(|| Err(Error::injection_failed("connect", "no display")));
    let player = Player::new(factory);

    let rx = player.play_events(vec![key("a")], PlayOptions::default()).unwrap();
    assert!(collect_steps(&rx).is_empty());
}

#[test]
fn new_session_replaces_the_running_one() {
    let backend = Recording::default();
    let player = Player::new(backend.factory());
    let endless = PlayOptions {
        repeat: 0,
        ..PlayOptions::default()
    };

    let first = player.play_events(vec![key("a")], endless).unwrap();
    first.recv_timeout(Duration::from_secs(5)).unwrap();

    let second = player.play_events(vec![key("b")], PlayOptions::default()).unwrap();
    assert_eq!(first.try_iter().last(), Some(PlaybackEvent::Done));
    assert_eq!(collect_steps(&second), [0]);
}

#[test]
fn move_lasts_its_recorded_duration() {
    let backend = Recording::default();
    let player = Player::new(backend.factory());

    // 200 ms of samples, then the action gap and the pass gap
    let elapsed = timed_run(&player, vec![straight_move(21, 0.2)], PlayOptions::default());
    assert!(elapsed >= Duration::from_millis(240), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(1), "{elapsed:?}");
    assert_eq!(backend.calls().len(), 21);
}

#[test]
fn speed_divides_path_time() {
    let backend = Recording::default();
    let player = Player::new(backend.factory());
    let opts = PlayOptions {
        speed: 2.0,
        ..PlayOptions::default()
    };

    let elapsed = timed_run(&player, vec![straight_move(21, 0.2)], opts);
    assert!(elapsed >= Duration::from_millis(140), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(240), "{elapsed:?}");
}

#[test]
fn action_gap_ignores_speed() {
    let backend = Recording::default();
    let player = Player::new(backend.factory());
    let opts = PlayOptions {
        speed: 100.0,
        ..PlayOptions::default()
    };
    let actions = vec![
        Action::new(ActionKind::Key { key: "a".into(), duration: 0.0 }),
        Action::new(ActionKind::Key { key: "b".into(), duration: 0.0 }),
    ];

    let elapsed = timed_run(&player, actions, opts);
    assert!(elapsed >= Duration::from_millis(60), "{elapsed:?}");
}

#[test]
fn stop_returns_promptly_mid_path() {
    let backend = Recording::default();
    let player = Player::new(backend.factory());
    let opts = PlayOptions {
        repeat: 0,
        ..PlayOptions::default()
    };

    let rx = player.play_events(vec![straight_move(50, 30.0)], opts).unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    std::thread::sleep(Duration::from_millis(30));

    let started = Instant::now();
    player.stop();
    assert!(started.elapsed() < Duration::from_millis(100), "{:?}", started.elapsed());
    assert_eq!(rx.try_iter().last(), Some(PlaybackEvent::Done));
}

#[test]
fn huge_step_times_wait_instead_of_failing() {
    let cases = [
        (straight_move(2, 1e20), PlayOptions::default()),
        (
            straight_move(3, 0.1),
            PlayOptions {
                speed: 1e-300,
                ..PlayOptions::default()
            },
        ),
    ];

    for (action, opts) in cases {
        let backend = Recording::default();
        let player = Player::new(backend.factory());

        let rx = player.play_events(vec![action, key("k")], opts).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(player.is_playing());
        assert_eq!(backend.calls(), [Call::Move(0.0, 0.0)]);

        player.stop();
        assert_eq!(collect_steps(&rx), [0]);
    }
}
