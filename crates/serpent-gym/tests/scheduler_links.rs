//! Integration test: the scheduler against in-process and file-based links.
//!
//! Checks that observers see every episode and tick in order, and that the
//! file-poll link carries state out and actions in.

use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use serpent_core::config::RunPlan;
use serpent_env::arena::Transition;
use serpent_gym::link::{ActionOrigin, FileLink};
use serpent_gym::observer::{ArenaEvent, ChannelObserver};
use serpent_gym::protocol::MessageKind;
use serpent_gym::scheduler::{EpisodeScheduler, RunOutcome};
use serpent_test_utils::{RecordingObserver, ScriptedLink, seeded_arena, straight_action};

fn plan(episodes: u32, max_steps: u32) -> RunPlan {
    RunPlan::default()
        .with_episodes(episodes)
        .with_max_steps(max_steps)
        .with_step_delay_ms(5)
        .with_episode_pause_ms(0)
}

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

#[test]
fn recording_observer_sees_every_tick() {
    let observer = RecordingObserver::new();
    let mut scheduler = EpisodeScheduler::new(seeded_arena(11), ScriptedLink::default())
        .with_seed(11)
        .with_observer(Box::new(observer.clone()));
    let summary = scheduler.start(&plan(2, 4)).unwrap();
    let rec = observer.recording();

    assert_eq!(rec.attached, Some(20));
    assert_eq!(rec.episodes_started, vec![1, 2]);
    assert_eq!(rec.ticks.len() as u64, summary.total_ticks);
    assert_eq!(rec.snapshots.len(), rec.ticks.len());
    assert_eq!(rec.episodes_ended.len(), 2);
    assert_eq!(rec.summary.as_ref(), Some(&summary));

    // Tick reports count up within each episode.
    for pair in rec.ticks.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if a.episode == b.episode {
            assert_eq!(b.step, a.step + 1);
        } else {
            assert_eq!(b.step, 1);
        }
    }
    assert!(
        rec.ticks
            .iter()
            .all(|t| t.origin == ActionOrigin::Fallback)
    );
}

#[test]
fn episode_reward_matches_tick_rewards() {
    let observer = RecordingObserver::new();
    let mut scheduler = EpisodeScheduler::new(seeded_arena(12), ScriptedLink::default())
        .with_seed(12)
        .with_observer(Box::new(observer.clone()));
    let summary = scheduler.start(&plan(1, 6)).unwrap();
    let rec = observer.recording();

    let sum: f64 = rec.ticks.iter().map(|t| t.reward).sum();
    assert!((sum - summary.stats.history[0].reward).abs() < 1e-9);
    let last = rec.ticks.last().unwrap();
    assert!((last.episode_reward - sum).abs() < 1e-9);
}

#[test]
fn terminal_tick_is_the_last_of_its_episode() {
    let observer = RecordingObserver::new();
    let mut scheduler = EpisodeScheduler::new(seeded_arena(13), ScriptedLink::default())
        .with_seed(13)
        .with_observer(Box::new(observer.clone()));
    scheduler.start(&plan(3, 0)).unwrap();
    let rec = observer.recording();

    for (i, tick) in rec.ticks.iter().enumerate() {
        let fatal = matches!(tick.transition, Transition::HitWall | Transition::HitBody);
        if fatal {
            assert!(rec.snapshots[i].done);
            if let Some(next) = rec.ticks.get(i + 1) {
                assert_eq!(next.episode, tick.episode + 1);
            }
        }
    }
    assert_eq!(rec.episodes_ended.len(), 3);
}

#[test]
fn channel_observer_reports_to_another_thread() {
    let (observer, events) = ChannelObserver::unbounded();
    let monitor = thread::spawn(move || {
        let mut ticks = 0usize;
        for event in events {
            match event {
                ArenaEvent::Tick { .. } => ticks += 1,
                ArenaEvent::Finished { outcome, episodes } => return (ticks, outcome, episodes),
                _ => {}
            }
        }
        panic!("channel closed before Finished");
    });

    let mut scheduler = EpisodeScheduler::new(seeded_arena(14), ScriptedLink::default())
        .with_seed(14)
        .with_observer(Box::new(observer));
    let summary = scheduler.start(&plan(2, 3)).unwrap();
    drop(scheduler);

    let (ticks, outcome, episodes) = monitor.join().unwrap();
    assert_eq!(ticks as u64, summary.total_ticks);
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(episodes, 2);
}

#[test]
fn scripted_actions_are_used_in_order() {
    let arena = seeded_arena(15);
    // The run starts with a reset; replay it to learn the opening heading.
    let mut probe = arena.clone();
    probe.reset();
    let straight = straight_action(&probe);

    let link = ScriptedLink::new([Some(straight), None, Some(straight)]);
    let observer = RecordingObserver::new();
    let mut scheduler = EpisodeScheduler::new(arena, link)
        .with_seed(15)
        .with_observer(Box::new(observer.clone()));
    scheduler.start(&plan(1, 2)).unwrap();
    let rec = observer.recording();

    assert_eq!(rec.ticks.len(), 2);
    assert_eq!(rec.ticks[0].origin, ActionOrigin::Peer);
    assert_eq!(rec.ticks[0].action, straight);
    assert_eq!(rec.ticks[1].origin, ActionOrigin::Fallback);
    assert_eq!(
        scheduler.link().sent_kinds(),
        vec![MessageKind::Init, MessageKind::State, MessageKind::State]
    );
}

// ---------------------------------------------------------------------------
// FileLink
// ---------------------------------------------------------------------------

#[test]
fn file_link_session_reads_actions_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("state.json");
    let action_path = dir.path().join("action.json");

    // Agent: answer each new state file with the heading it reports.
    let agent_state = state_path.clone();
    let agent_action = action_path.clone();
    let agent = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut last = String::new();
        let mut answered = 0usize;
        while Instant::now() < deadline && answered < 4 {
            let Ok(text) = fs::read_to_string(&agent_state) else {
                thread::sleep(Duration::from_millis(2));
                continue;
            };
            if text != last && text.contains("\"STATE\"") {
                let msg = serpent_gym::framing::decode(&text).unwrap();
                let direction = msg.get_i64("direction").unwrap();
                fs::write(&agent_action, format!("{{\"action\": {direction}}}")).unwrap();
                answered += 1;
                last = text;
            }
            thread::sleep(Duration::from_millis(2));
        }
        answered
    });

    let link = FileLink::new(&state_path, &action_path);
    let mut scheduler = EpisodeScheduler::new(seeded_arena(16), link)
        .with_seed(16)
        .with_observer(Box::new(RecordingObserver::new()));
    let summary = scheduler.start(&plan(1, 4).with_step_delay_ms(200)).unwrap();
    let answered = agent.join().unwrap();

    assert_eq!(summary.total_ticks, 4);
    assert!(answered >= 1);
    assert!(summary.peer_actions >= 1);
    let last = serpent_gym::framing::decode(&fs::read_to_string(&state_path).unwrap()).unwrap();
    assert_eq!(last.kind(), MessageKind::State);
}
