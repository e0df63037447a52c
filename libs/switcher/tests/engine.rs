mod common;

use std::time::Duration;

use chrono::Utc;
use common::{FakeRemote, MAIN, PREFIX, STAGING, program, transform_override};
use scenesched_shared::Program;
use scenesched_shared::events::TargetProgramState;
use scenesched_switcher::{RemoteError, SceneLayout, SwitchError, Switcher};
use serde_json::json;

fn switcher() -> Switcher {
    Switcher::new(SceneLayout {
        main: MAIN.to_string(),
        staging: STAGING.to_string(),
        prefix: PREFIX.to_string(),
    })
}

fn declare(target: Option<Program>) -> TargetProgramState {
    TargetProgramState {
        timestamp: Utc::now(),
        target,
        next: None,
        seek_offset: Duration::from_secs(90),
    }
}

#[tokio::test]
async fn first_switch_puts_target_on_air() {
    let remote = FakeRemote::with_scenes();
    let engine = switcher();
    let news = program("news", "news", "ffmpeg_source");

    let outcome = engine
        .converge(remote.as_ref(), &declare(Some(news.clone())))
        .await
        .expect("switch should succeed")
        .expect("target differs from nothing");

    assert_eq!(outcome.previous, None);
    assert_eq!(outcome.current.as_ref().map(|p| p.id.as_str()), Some("news"));
    assert_eq!(outcome.to_event().seek_offset_ms, 90_000);
    assert_eq!(engine.active_program().map(|p| p.id), Some("news".to_string()));

    let live = remote.items(MAIN);
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].source_name, "_sched_news");
    assert!(live[0].enabled);
    assert!(remote.items(STAGING).is_empty(), "staged copy removed");

    let input = remote.input("_sched_news").expect("input created");
    assert_eq!(input.kind, "ffmpeg_source");
    assert_eq!(input.settings.get("local_file"), Some(&json!("/media/news.mp4")));
    assert_eq!(input.settings.get("looping"), Some(&json!(false)), "kind defaults kept");
}

#[tokio::test]
async fn converging_twice_is_a_no_op() {
    let remote = FakeRemote::with_scenes();
    let engine = switcher();
    let declaration = declare(Some(program("news", "news", "ffmpeg_source")));

    engine
        .converge(remote.as_ref(), &declaration)
        .await
        .expect("first switch");
    remote.clear_calls();

    let second = engine
        .converge(remote.as_ref(), &declaration)
        .await
        .expect("second convergence");

    assert!(second.is_none());
    assert!(remote.calls().is_empty(), "no remote calls at all: {:?}", remote.calls());
}

#[tokio::test]
async fn identity_is_by_id_only() {
    let remote = FakeRemote::with_scenes();
    let engine = switcher();
    engine
        .converge(remote.as_ref(), &declare(Some(program("news", "news", "ffmpeg_source"))))
        .await
        .expect("first switch");
    remote.clear_calls();

    let mut renamed = program("news", "other-source", "vlc_source");
    renamed.title = "Renamed".to_string();
    let outcome = engine
        .converge(remote.as_ref(), &declare(Some(renamed)))
        .await
        .expect("convergence");

    assert!(outcome.is_none());
    assert_eq!(remote.mutation_count(), 0);
}

#[tokio::test]
async fn switching_replaces_outgoing_program() {
    let remote = FakeRemote::with_scenes();
    let engine = switcher();
    engine
        .converge(remote.as_ref(), &declare(Some(program("news", "news", "ffmpeg_source"))))
        .await
        .expect("first switch");

    let outcome = engine
        .converge(remote.as_ref(), &declare(Some(program("movie", "movie", "vlc_source"))))
        .await
        .expect("second switch")
        .expect("real change");

    assert_eq!(outcome.previous.map(|p| p.id), Some("news".to_string()));
    assert_eq!(remote.item_names(MAIN), vec!["_sched_movie".to_string()]);
    assert!(remote.input("_sched_news").is_none(), "outgoing input removed");
    assert_eq!(
        remote.input("_sched_movie").expect("new input").settings.get("playlist"),
        Some(&json!([{"value": "/media/movie.mp4"}]))
    );
}

#[tokio::test]
async fn shared_source_name_is_not_cleaned_up_after_switch() {
    let remote = FakeRemote::with_scenes();
    let engine = switcher();
    engine
        .converge(remote.as_ref(), &declare(Some(program("first", "loop", "ffmpeg_source"))))
        .await
        .expect("first switch");

    engine
        .converge(remote.as_ref(), &declare(Some(program("second", "loop", "ffmpeg_source"))))
        .await
        .expect("second switch");

    assert_eq!(remote.item_names(MAIN), vec!["_sched_loop".to_string()]);
    assert!(remote.input("_sched_loop").is_some());
    assert_eq!(engine.active_program().map(|p| p.id), Some("second".to_string()));
}

#[tokio::test]
async fn unsupported_kind_aborts_before_any_mutation() {
    let remote = FakeRemote::with_scenes();
    let engine = switcher();

    let err = engine
        .converge(remote.as_ref(), &declare(Some(program("x", "x", "ndi_source"))))
        .await
        .expect_err("kind is not registered");

    assert!(matches!(err, SwitchError::UnsupportedKind { ref kind } if kind == "ndi_source"));
    assert_eq!(remote.mutation_count(), 0);
    assert!(engine.active_program().is_none());
}

#[tokio::test]
async fn duplication_failure_keeps_last_applied_and_retries() {
    let remote = FakeRemote::with_scenes();
    let engine = switcher();
    engine
        .converge(remote.as_ref(), &declare(Some(program("news", "news", "ffmpeg_source"))))
        .await
        .expect("first switch");

    remote.fail("duplicate_scene_item", RemoteError::request("duplicate_scene_item", "boom"));
    let target = declare(Some(program("movie", "movie", "ffmpeg_source")));
    let err = engine
        .converge(remote.as_ref(), &target)
        .await
        .expect_err("duplication fails");

    assert!(matches!(err, SwitchError::Duplicate { .. }));
    assert_eq!(engine.active_program().map(|p| p.id), Some("news".to_string()));
    assert_eq!(remote.item_names(MAIN), vec!["_sched_news".to_string()], "outgoing untouched");
    assert!(remote.items(STAGING).is_empty(), "staged copy removed");
    assert!(remote.input("_sched_movie").is_none(), "created input compensated");

    remote.heal("duplicate_scene_item");
    remote.clear_calls();
    let outcome = engine
        .converge(remote.as_ref(), &target)
        .await
        .expect("retry succeeds");

    assert!(outcome.is_some());
    assert_eq!(remote.call_count("create_input"), 1, "full sequence replayed");
    assert_eq!(remote.call_count("duplicate_scene_item"), 1);
    assert_eq!(remote.item_names(MAIN), vec!["_sched_movie".to_string()]);
    assert_eq!(engine.active_program().map(|p| p.id), Some("movie".to_string()));
}

#[tokio::test]
async fn enable_failure_removes_duplicated_item() {
    let remote = FakeRemote::with_scenes();
    let engine = switcher();
    remote.fail("set_scene_item_enabled", RemoteError::request("set_scene_item_enabled", "boom"));

    let err = engine
        .converge(remote.as_ref(), &declare(Some(program("news", "news", "ffmpeg_source"))))
        .await
        .expect_err("enable fails");

    assert!(matches!(err, SwitchError::Enable { .. }));
    assert!(remote.items(MAIN).is_empty());
    assert!(remote.items(STAGING).is_empty());
    assert!(remote.input_names().is_empty());
    assert!(engine.active_program().is_none());
}

#[tokio::test]
async fn orphan_sweep_spares_unmanaged_items() {
    let remote = FakeRemote::with_scenes();
    remote.seed_item(MAIN, "_sched_leftover", "ffmpeg_source");
    remote.seed_item(MAIN, "Webcam", "v4l2_input");
    let engine = switcher();

    engine
        .converge(remote.as_ref(), &declare(Some(program("news", "news", "ffmpeg_source"))))
        .await
        .expect("switch");

    let mut names = remote.item_names(MAIN);
    names.sort();
    assert_eq!(names, vec!["Webcam".to_string(), "_sched_news".to_string()]);
    assert!(remote.input("_sched_leftover").is_none());
    assert!(remote.input("Webcam").is_some());
}

#[tokio::test]
async fn stale_input_with_managed_name_is_replaced() {
    let remote = FakeRemote::with_scenes();
    remote.seed_item(STAGING, "_sched_news", "ffmpeg_source");
    let engine = switcher();

    engine
        .converge(remote.as_ref(), &declare(Some(program("news", "news", "ffmpeg_source"))))
        .await
        .expect("stale input does not block the switch");

    assert_eq!(remote.item_names(MAIN), vec!["_sched_news".to_string()]);
    assert!(remote.items(STAGING).is_empty());
}

#[tokio::test]
async fn transform_overrides_patch_the_stretched_base() {
    let remote = FakeRemote::with_scenes();
    let engine = switcher();
    let mut news = program("news", "news", "ffmpeg_source");
    news.transform = transform_override();

    engine
        .converge(remote.as_ref(), &declare(Some(news)))
        .await
        .expect("switch");

    let live = &remote.items(MAIN)[0];
    assert_eq!(live.transform.get("positionX"), Some(&json!(120.0)), "override applied");
    assert_eq!(live.transform.get("scaleX"), Some(&json!(0.5)));
    assert_eq!(live.transform.get("boundsType"), Some(&json!("OBS_BOUNDS_STRETCH")), "base kept");
    assert_eq!(live.transform.get("boundsWidth"), Some(&json!(1920.0)));
    assert_eq!(live.transform.get("rotation"), Some(&json!(0.0)), "untouched field kept");
}

#[tokio::test]
async fn transform_failure_aborts_and_cleans_up() {
    let remote = FakeRemote::with_scenes();
    let engine = switcher();
    remote.fail("scene_item_transform", RemoteError::request("scene_item_transform", "boom"));
    let mut news = program("news", "news", "ffmpeg_source");
    news.transform = transform_override();

    let err = engine
        .converge(remote.as_ref(), &declare(Some(news)))
        .await
        .expect_err("transform read fails");

    assert!(matches!(err, SwitchError::Transform { .. }));
    assert!(remote.input_names().is_empty());
    assert!(remote.items(STAGING).is_empty());
    assert!(engine.active_program().is_none());
}

#[tokio::test]
async fn cleanup_errors_do_not_abort_the_switch() {
    let remote = FakeRemote::with_scenes();
    let engine = switcher();
    engine
        .converge(remote.as_ref(), &declare(Some(program("news", "news", "ffmpeg_source"))))
        .await
        .expect("first switch");
    remote.fail("scene_item_id", RemoteError::request("scene_item_id", "timeout"));

    let outcome = engine
        .converge(remote.as_ref(), &declare(Some(program("movie", "movie", "ffmpeg_source"))))
        .await
        .expect("cleanup is best-effort");

    assert!(outcome.is_some());
    assert_eq!(engine.active_program().map(|p| p.id), Some("movie".to_string()));
    assert_eq!(remote.item_names(MAIN), vec!["_sched_movie".to_string()]);
}

#[tokio::test]
async fn empty_target_takes_program_off_air() {
    let remote = FakeRemote::with_scenes();
    let engine = switcher();
    engine
        .converge(remote.as_ref(), &declare(Some(program("news", "news", "ffmpeg_source"))))
        .await
        .expect("first switch");

    let outcome = engine
        .converge(remote.as_ref(), &declare(None))
        .await
        .expect("clearing succeeds")
        .expect("real change");

    assert_eq!(outcome.previous.map(|p| p.id), Some("news".to_string()));
    assert!(outcome.current.is_none());
    assert!(remote.items(MAIN).is_empty());
    assert!(engine.active_program().is_none());

    remote.clear_calls();
    let again = engine.converge(remote.as_ref(), &declare(None)).await.expect("no-op");
    assert!(again.is_none());
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn reset_forgets_last_applied() {
    let remote = FakeRemote::with_scenes();
    let engine = switcher();
    engine
        .converge(remote.as_ref(), &declare(Some(program("news", "news", "ffmpeg_source"))))
        .await
        .expect("first switch");

    engine.reset().await;

    assert!(engine.active_program().is_none());
}
