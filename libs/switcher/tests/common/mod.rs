#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use scenesched_shared::{Program, Settings};
use scenesched_switcher::{
    CanvasSize, Connector, Endpoint, NewInput, ProductionApi, RemoteConnection, RemoteError,
    RemoteEvent, SceneItem, SceneItemId,
};
use serde_json::json;
use tokio::sync::mpsc;

pub const MAIN: &str = "Schedule";
pub const STAGING: &str = "Schedule Aux";
pub const PREFIX: &str = "_sched_";

const MUTATIONS: &[&str] = &[
    "create_scene",
    "remove_scene_item",
    "set_scene_item_enabled",
    "set_scene_item_transform",
    "duplicate_scene_item",
    "create_input",
    "remove_input",
];

#[derive(Debug, Clone, PartialEq)]
pub struct FakeItem {
    pub id: SceneItemId,
    pub source_name: String,
    pub enabled: bool,
    pub transform: Settings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeInput {
    pub kind: String,
    pub settings: Settings,
}

#[derive(Default)]
struct World {
    scenes: BTreeMap<String, Vec<FakeItem>>,
    inputs: BTreeMap<String, FakeInput>,
    next_id: SceneItemId,
    calls: Vec<String>,
    failures: HashMap<String, RemoteError>,
    output_active: bool,
}

/// Scripted in-memory remote. Records every call and fails any operation on
/// request.
pub struct FakeRemote {
    world: Mutex<World>,
    kinds: Vec<String>,
    events: Mutex<Option<mpsc::Sender<RemoteEvent>>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            world: Mutex::new(World {
                next_id: 1,
                ..World::default()
            }),
            kinds: ["ffmpeg_source", "vlc_source", "browser_source", "image_source"]
                .iter()
                .map(|kind| kind.to_string())
                .collect(),
            events: Mutex::new(None),
        })
    }

    /// A remote that already has both working scenes.
    pub fn with_scenes() -> Arc<Self> {
        let remote = Self::new();
        remote.add_scene(MAIN);
        remote.add_scene(STAGING);
        remote
    }

    fn world(&self) -> std::sync::MutexGuard<'_, World> {
        self.world.lock().expect("fake world lock")
    }

    pub fn add_scene(&self, scene: &str) {
        self.world().scenes.entry(scene.to_string()).or_default();
    }

    /// Put an item straight into a scene, bypassing call recording.
    pub fn seed_item(&self, scene: &str, source_name: &str, kind: &str) -> SceneItemId {
        let mut world = self.world();
        let id = world.next_id;
        world.next_id += 1;
        world.inputs.entry(source_name.to_string()).or_insert(FakeInput {
            kind: kind.to_string(),
            settings: Settings::new(),
        });
        world.scenes.entry(scene.to_string()).or_default().push(FakeItem {
            id,
            source_name: source_name.to_string(),
            enabled: true,
            transform: base_transform(),
        });
        id
    }

    pub fn fail(&self, operation: &str, error: RemoteError) {
        self.world().failures.insert(operation.to_string(), error);
    }

    pub fn heal(&self, operation: &str) {
        self.world().failures.remove(operation);
    }

    pub fn set_output_active(&self, active: bool) {
        self.world().output_active = active;
    }

    pub fn items(&self, scene: &str) -> Vec<FakeItem> {
        self.world().scenes.get(scene).cloned().unwrap_or_default()
    }

    pub fn item_names(&self, scene: &str) -> Vec<String> {
        self.items(scene).into_iter().map(|item| item.source_name).collect()
    }

    pub fn input(&self, name: &str) -> Option<FakeInput> {
        self.world().inputs.get(name).cloned()
    }

    pub fn input_names(&self) -> Vec<String> {
        self.world().inputs.keys().cloned().collect()
    }

    pub fn scene_list(&self) -> Vec<String> {
        self.world().scenes.keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.world().calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.world().calls.iter().filter(|call| *call == operation).count()
    }

    pub fn mutation_count(&self) -> usize {
        self.world()
            .calls
            .iter()
            .filter(|call| MUTATIONS.contains(&call.as_str()))
            .count()
    }

    pub fn clear_calls(&self) {
        self.world().calls.clear();
    }

    pub fn push_event(&self, event: RemoteEvent) {
        let sender = self.events.lock().expect("events lock").clone();
        if let Some(sender) = sender {
            let _ = sender.try_send(event);
        }
    }

    /// Drop the event sender so the session's stream ends.
    pub fn close_events(&self) {
        self.events.lock().expect("events lock").take();
    }

    fn open_events(&self) -> mpsc::Receiver<RemoteEvent> {
        let (tx, rx) = mpsc::channel(16);
        *self.events.lock().expect("events lock") = Some(tx);
        rx
    }

    /// Record the call and return the scripted failure, if any.
    fn enter(&self, operation: &str) -> Result<std::sync::MutexGuard<'_, World>, RemoteError> {
        let mut world = self.world();
        world.calls.push(operation.to_string());
        match world.failures.get(operation) {
            Some(error) => Err(error.clone()),
            None => Ok(world),
        }
    }
}

pub fn base_transform() -> Settings {
    Settings::new()
        .with("positionX", 0.0)
        .with("positionY", 0.0)
        .with("rotation", 0.0)
        .with("scaleX", 1.0)
        .with("scaleY", 1.0)
        .with("alignment", 5)
        .with("boundsType", "OBS_BOUNDS_NONE")
        .with("boundsWidth", 0.0)
        .with("boundsHeight", 0.0)
}

fn find_item<'a>(
    world: &'a mut World,
    scene: &str,
    item: SceneItemId,
) -> Result<&'a mut FakeItem, RemoteError> {
    world
        .scenes
        .get_mut(scene)
        .ok_or_else(|| RemoteError::NotFound(format!("scene {scene}")))?
        .iter_mut()
        .find(|candidate| candidate.id == item)
        .ok_or_else(|| RemoteError::NotFound(format!("scene item {item}")))
}

#[async_trait]
impl ProductionApi for FakeRemote {
    async fn version(&self) -> Result<String, RemoteError> {
        self.enter("version")?;
        Ok("30.1.2".to_string())
    }

    async fn input_kinds(&self) -> Result<Vec<String>, RemoteError> {
        self.enter("input_kinds")?;
        Ok(self.kinds.clone())
    }

    async fn scene_names(&self) -> Result<Vec<String>, RemoteError> {
        let world = self.enter("scene_names")?;
        Ok(world.scenes.keys().cloned().collect())
    }

    async fn create_scene(&self, scene: &str) -> Result<(), RemoteError> {
        let mut world = self.enter("create_scene")?;
        world.scenes.entry(scene.to_string()).or_default();
        Ok(())
    }

    async fn scene_items(&self, scene: &str) -> Result<Vec<SceneItem>, RemoteError> {
        let world = self.enter("scene_items")?;
        let items = world
            .scenes
            .get(scene)
            .ok_or_else(|| RemoteError::NotFound(format!("scene {scene}")))?;
        Ok(items
            .iter()
            .map(|item| SceneItem {
                id: item.id,
                source_name: item.source_name.clone(),
                enabled: item.enabled,
            })
            .collect())
    }

    async fn scene_item_id(
        &self,
        scene: &str,
        source_name: &str,
    ) -> Result<SceneItemId, RemoteError> {
        let world = self.enter("scene_item_id")?;
        world
            .scenes
            .get(scene)
            .and_then(|items| items.iter().find(|item| item.source_name == source_name))
            .map(|item| item.id)
            .ok_or_else(|| RemoteError::NotFound(format!("{source_name} in {scene}")))
    }

    async fn remove_scene_item(&self, scene: &str, item: SceneItemId) -> Result<(), RemoteError> {
        let mut world = self.enter("remove_scene_item")?;
        let items = world
            .scenes
            .get_mut(scene)
            .ok_or_else(|| RemoteError::NotFound(format!("scene {scene}")))?;
        let before = items.len();
        items.retain(|candidate| candidate.id != item);
        if items.len() == before {
            return Err(RemoteError::NotFound(format!("scene item {item}")));
        }
        Ok(())
    }

    async fn set_scene_item_enabled(
        &self,
        scene: &str,
        item: SceneItemId,
        enabled: bool,
    ) -> Result<(), RemoteError> {
        let mut world = self.enter("set_scene_item_enabled")?;
        find_item(&mut world, scene, item)?.enabled = enabled;
        Ok(())
    }

    async fn scene_item_transform(
        &self,
        scene: &str,
        item: SceneItemId,
    ) -> Result<Settings, RemoteError> {
        let mut world = self.enter("scene_item_transform")?;
        Ok(find_item(&mut world, scene, item)?.transform.clone())
    }

    async fn set_scene_item_transform(
        &self,
        scene: &str,
        item: SceneItemId,
        transform: &Settings,
    ) -> Result<(), RemoteError> {
        let mut world = self.enter("set_scene_item_transform")?;
        find_item(&mut world, scene, item)?.transform.apply_patch(transform);
        Ok(())
    }

    async fn duplicate_scene_item(
        &self,
        from_scene: &str,
        item: SceneItemId,
        to_scene: &str,
    ) -> Result<SceneItemId, RemoteError> {
        let mut world = self.enter("duplicate_scene_item")?;
        if !world.scenes.contains_key(to_scene) {
            return Err(RemoteError::NotFound(format!("scene {to_scene}")));
        }
        let mut copy = find_item(&mut world, from_scene, item)?.clone();
        copy.id = world.next_id;
        world.next_id += 1;
        let id = copy.id;
        world.scenes.entry(to_scene.to_string()).or_default().push(copy);
        Ok(id)
    }

    async fn create_input(&self, input: &NewInput) -> Result<SceneItemId, RemoteError> {
        let mut world = self.enter("create_input")?;
        if world.inputs.contains_key(&input.name) {
            return Err(RemoteError::request(
                "create_input",
                format!("input {} already exists", input.name),
            ));
        }
        if !world.scenes.contains_key(&input.scene) {
            return Err(RemoteError::NotFound(format!("scene {}", input.scene)));
        }
        let id = world.next_id;
        world.next_id += 1;
        world.inputs.insert(
            input.name.clone(),
            FakeInput {
                kind: input.kind.clone(),
                settings: input.settings.clone(),
            },
        );
        world.scenes.entry(input.scene.clone()).or_default().push(FakeItem {
            id,
            source_name: input.name.clone(),
            enabled: input.enabled,
            transform: base_transform(),
        });
        Ok(id)
    }

    async fn remove_input(&self, name: &str) -> Result<(), RemoteError> {
        let mut world = self.enter("remove_input")?;
        if world.inputs.remove(name).is_none() {
            return Err(RemoteError::NotFound(format!("input {name}")));
        }
        for items in world.scenes.values_mut() {
            items.retain(|item| item.source_name != name);
        }
        Ok(())
    }

    async fn input_default_settings(&self, kind: &str) -> Result<Settings, RemoteError> {
        self.enter("input_default_settings")?;
        Ok(match kind {
            "ffmpeg_source" => Settings::new()
                .with("looping", false)
                .with("restart_on_activate", true),
            "vlc_source" => Settings::new().with("loop", true),
            _ => Settings::new(),
        })
    }

    async fn canvas_size(&self) -> Result<CanvasSize, RemoteError> {
        self.enter("canvas_size")?;
        Ok(CanvasSize {
            width: 1920,
            height: 1080,
        })
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        self.enter("ping")?;
        Ok(())
    }

    async fn output_active(&self) -> Result<bool, RemoteError> {
        let world = self.enter("output_active")?;
        Ok(world.output_active)
    }

    async fn disconnect(&self) {
        self.world().calls.push("disconnect".to_string());
    }
}

/// Hands out sessions on a shared [`FakeRemote`].
pub struct FakeConnector {
    pub remote: Arc<FakeRemote>,
    refuse: AtomicBool,
    attempts: AtomicUsize,
}

impl FakeConnector {
    pub fn new(remote: Arc<FakeRemote>) -> Arc<Self> {
        Arc::new(Self {
            remote,
            refuse: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<RemoteConnection, RemoteError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(RemoteError::Connect {
                address: endpoint.address(),
                message: "connection refused".to_string(),
            });
        }
        let events = self.remote.open_events();
        let api: Arc<dyn ProductionApi> = self.remote.clone();
        Ok(RemoteConnection { api, events })
    }
}

pub fn program(id: &str, source_name: &str, kind: &str) -> Program {
    Program {
        id: id.to_string(),
        title: id.to_uppercase(),
        source_name: source_name.to_string(),
        input_kind: kind.to_string(),
        uri: format!("/media/{source_name}.mp4"),
        input_settings: Settings::new(),
        transform: Settings::new(),
        start: None,
        end: None,
    }
}

pub fn transform_override() -> Settings {
    Settings::new().with("positionX", json!(120.0)).with("scaleX", json!(0.5))
}
