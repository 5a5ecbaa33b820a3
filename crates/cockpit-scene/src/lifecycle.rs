//! Mount, load, frame and teardown of the cockpit scene

use bevy::asset::RenderAssetUsages;
use bevy::ecs::message::Messages;
use bevy::prelude::*;
use bevy::render::render_resource::{
    Extent3d, TextureDimension, TextureFormat, TextureViewDescriptor, TextureViewDimension,
};
use bevy::scene::{SceneInstance, SceneSpawner};
use bevy::window::PrimaryWindow;

use crate::bounds::NodeQuery;
use crate::config::ViewerConfig;
use crate::controls::{CockpitCamera, OrbitControls, PointerCapture};
use crate::hints::HintOverlay;
use crate::input::InputState;
use crate::loader::{ModelAsset, ModelLoadFinished, ModelLoadRequested};
use crate::normalize::normalize_subtree;

/// Stage of the current mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecyclePhase {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

impl LifecyclePhase {
    pub fn can_transition_to(self, next: LifecyclePhase) -> bool {
        matches!(
            (self, next),
            (LifecyclePhase::Idle, LifecyclePhase::Loading)
                | (LifecyclePhase::Loading, LifecyclePhase::Ready)
                | (LifecyclePhase::Loading, LifecyclePhase::Error)
        )
    }
}

#[derive(Resource, Debug, Default, Clone, PartialEq, Eq)]
pub struct ScenePhase {
    phase: LifecyclePhase,
    /// Last load error, shown by the overlay
    pub error: Option<String>,
}

impl ScenePhase {
    pub fn get(&self) -> LifecyclePhase {
        self.phase
    }

    /// Move to `next` if the transition is legal; returns whether it happened
    pub fn transition(&mut self, next: LifecyclePhase) -> bool {
        if !self.phase.can_transition_to(next) {
            tracing::warn!("Rejected lifecycle transition {:?} -> {:?}", self.phase, next);
            return false;
        }
        tracing::debug!("Lifecycle {:?} -> {:?}", self.phase, next);
        self.phase = next;
        true
    }

    pub fn fail(&mut self, message: String) -> bool {
        let moved = self.transition(LifecyclePhase::Error);
        if moved {
            self.error = Some(message);
        }
        moved
    }

    pub fn reset(&mut self) {
        self.phase = LifecyclePhase::Idle;
        self.error = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MountId(pub u64);

/// Identity of the live mount. Cleared first thing on teardown so late
/// results can tell they are stale.
#[derive(Resource, Debug, Default)]
pub struct ActiveMount {
    current: Option<MountId>,
    last: u64,
}

impl ActiveMount {
    pub fn current(&self) -> Option<MountId> {
        self.current
    }

    pub fn is_current(&self, mount: MountId) -> bool {
        self.current == Some(mount)
    }

    fn begin(&mut self) -> MountId {
        self.last += 1;
        let mount = MountId(self.last);
        self.current = Some(mount);
        mount
    }

    /// Returns the mount that was active
    pub fn invalidate(&mut self) -> Option<MountId> {
        self.current.take()
    }
}

/// Running totals across all mounts of the session
#[derive(Resource, Debug, Default, Clone, PartialEq, Eq)]
pub struct MountLedger {
    pub mounts: u32,
    pub teardowns: u32,
    pub cameras_released: u32,
    pub controls_released: u32,
    pub environments_released: u32,
    pub load_failures: u32,
}

/// Ask for teardown followed by a fresh mount
#[derive(Message, Debug, Clone, Default)]
pub struct RemountRequested;

/// Tags every entity spawned for a mount
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountScoped(pub MountId);

/// Parent of the attached model
#[derive(Component)]
pub struct WorldGroup;

/// Root entity of the attached model
#[derive(Component)]
pub struct ModelRoot;

/// Attached but not yet normalized and revealed
#[derive(Component)]
pub struct FramePending;

/// Last seen logical size of the primary window
#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct ViewportSize {
    pub width: f32,
    pub height: f32,
}

impl Default for ViewportSize {
    fn default() -> Self {
        Self {
            width: 1.0,
            height: 1.0,
        }
    }
}

/// Set `aspect_ratio` to `width / height`. Leaves the projection alone and
/// returns false for a collapsed surface.
pub fn fit_projection(projection: &mut PerspectiveProjection, width: f32, height: f32) -> bool {
    if width <= 0.0 || height <= 0.0 {
        return false;
    }
    projection.aspect_ratio = width / height;
    true
}

/// Scale factor override for a device ratio above `max`
pub fn capped_scale_factor(device: f32, max: f32) -> Option<f32> {
    (device > max).then_some(max)
}

/// Everything a mount owns. Built by [`mount_scene`], consumed by
/// [`SceneContext::dispose`].
#[derive(Resource, Debug)]
pub struct SceneContext {
    pub mount: MountId,
    pub camera: Entity,
    pub world_group: Entity,
    pub lights: Vec<Entity>,
    pub environment: Vec<Handle<Image>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DisposeReport {
    pub cameras: u32,
    pub controls: u32,
    pub environments: u32,
    pub lights: u32,
}

impl SceneContext {
    pub fn dispose(self, world: &mut World) -> DisposeReport {
        let mut report = DisposeReport::default();

        if let Ok(camera) = world.get_entity_mut(self.camera) {
            if camera.contains::<OrbitControls>() {
                report.controls += 1;
            }
            camera.despawn();
            report.cameras += 1;
        }

        for light in self.lights {
            if let Ok(light) = world.get_entity_mut(light) {
                light.despawn();
                report.lights += 1;
            }
        }

        if let Ok(group) = world.get_entity_mut(self.world_group) {
            group.despawn();
        }

        if let Some(mut images) = world.get_resource_mut::<Assets<Image>>() {
            for handle in self.environment {
                if images.remove(&handle).is_some() {
                    report.environments += 1;
                }
            }
        }

        report
    }
}

pub fn mount_scene(
    mut commands: Commands,
    existing: Option<Res<SceneContext>>,
    config: Res<ViewerConfig>,
    mut active: ResMut<ActiveMount>,
    mut phase: ResMut<ScenePhase>,
    mut ledger: ResMut<MountLedger>,
    mut images: ResMut<Assets<Image>>,
    mut windows: Query<&mut Window, With<PrimaryWindow>>,
    mut requests: MessageWriter<ModelLoadRequested>,
) {
    if let Some(existing) = existing {
        tracing::warn!("Cockpit scene already mounted as {:?}", existing.mount);
        return;
    }

    let mount = active.begin();
    ledger.mounts += 1;

    let mut viewport = ViewportSize::default();
    if let Ok(mut window) = windows.single_mut() {
        let device = window.resolution.base_scale_factor();
        let cap = capped_scale_factor(device, config.render.max_pixel_ratio);
        window.resolution.set_scale_factor_override(cap);
        viewport = ViewportSize {
            width: window.width(),
            height: window.height(),
        };
    }

    let render = &config.render;
    let [r, g, b] = render.background;
    let background = Color::srgb(r, g, b);
    let position = Vec3::from(render.provisional_position);
    let target = Vec3::from(render.provisional_target);

    let mut projection = PerspectiveProjection {
        fov: render.fov_degrees.to_radians(),
        near: render.near,
        far: render.far,
        ..default()
    };
    fit_projection(&mut projection, viewport.width, viewport.height);

    // Sky over dark asphalt, standing in for a hemisphere light
    let cubemap = images.add(environment_cubemap(
        Color::srgb(1.0, 1.0, 1.0),
        Color::srgb(0.6, 0.6, 0.6),
        Color::srgb(0.27, 0.27, 0.27),
    ));
    let environment = EnvironmentMapLight {
        diffuse_map: cubemap.clone(),
        specular_map: cubemap.clone(),
        intensity: render.environment_intensity,
        ..default()
    };
    let environment_images = vec![cubemap];

    let camera = commands
        .spawn((
            Name::new("Cockpit Camera"),
            Camera3d::default(),
            Camera {
                clear_color: ClearColorConfig::Custom(background),
                ..default()
            },
            Projection::Perspective(projection),
            Transform::from_translation(position).looking_at(target, Vec3::Y),
            OrbitControls::from_config(&config.controls, target),
            AmbientLight {
                color: Color::WHITE,
                brightness: render.ambient_brightness,
                ..default()
            },
            environment,
            CockpitCamera,
            MountScoped(mount),
        ))
        .id();

    let key_light = commands
        .spawn((
            Name::new("Key Light"),
            DirectionalLight {
                illuminance: render.key_illuminance,
                shadows_enabled: false,
                ..default()
            },
            Transform::from_xyz(3.0, 4.0, 2.0).looking_at(Vec3::ZERO, Vec3::Y),
            MountScoped(mount),
        ))
        .id();

    let fill_light = commands
        .spawn((
            Name::new("Fill Light"),
            DirectionalLight {
                illuminance: render.key_illuminance * 0.25,
                color: Color::srgb(0.85, 0.9, 1.0),
                shadows_enabled: false,
                ..default()
            },
            Transform::from_xyz(-2.0, 1.0, -3.0).looking_at(Vec3::ZERO, Vec3::Y),
            MountScoped(mount),
        ))
        .id();

    let world_group = commands
        .spawn((
            Name::new("World Group"),
            WorldGroup,
            Transform::default(),
            Visibility::default(),
            MountScoped(mount),
        ))
        .id();

    commands.insert_resource(SceneContext {
        mount,
        camera,
        world_group,
        lights: vec![key_light, fill_light],
        environment: environment_images,
    });
    commands.insert_resource(InputState::default());
    commands.insert_resource(HintOverlay::default());
    commands.insert_resource(viewport);

    phase.transition(LifecyclePhase::Loading);
    requests.write(ModelLoadRequested {
        mount,
        url: config.model.url.clone(),
    });

    tracing::info!("Mounted cockpit scene {:?} ({}x{})", mount, viewport.width, viewport.height);
}

/// One-texel cube map lit from above: `sky` on +Y, `ground` on -Y and
/// `horizon` on the four side faces
pub fn environment_cubemap(sky: Color, horizon: Color, ground: Color) -> Image {
    let [sky, horizon, ground] = [sky, horizon, ground].map(|color| color.to_srgba().to_u8_array());
    // Face order is +X, -X, +Y, -Y, +Z, -Z
    let faces = [horizon, horizon, sky, ground, horizon, horizon];

    let mut image = Image::new(
        Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 6,
        },
        TextureDimension::D2,
        faces.concat(),
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::MAIN_WORLD | RenderAssetUsages::RENDER_WORLD,
    );
    image.texture_view_descriptor = Some(TextureViewDescriptor {
        dimension: Some(TextureViewDimension::Cube),
        ..default()
    });
    image
}

pub fn teardown_scene(world: &mut World) {
    let previous = world.resource_mut::<ActiveMount>().invalidate();

    world.remove_resource::<InputState>();
    world.remove_resource::<ViewportSize>();
    world.remove_resource::<HintOverlay>();

    let report = match world.remove_resource::<SceneContext>() {
        Some(context) => context.dispose(world),
        None => DisposeReport::default(),
    };

    if let Some(mount) = previous {
        let mut scoped = world.query::<(Entity, &MountScoped)>();
        let stragglers: Vec<Entity> = scoped
            .iter(world)
            .filter(|(_, scope)| scope.0 == mount)
            .map(|(entity, _)| entity)
            .collect();
        for entity in stragglers {
            if let Ok(entity) = world.get_entity_mut(entity) {
                entity.despawn();
            }
        }
    }

    let mut windows = world.query_filtered::<&mut Window, With<PrimaryWindow>>();
    for mut window in windows.iter_mut(world) {
        window.resolution.set_scale_factor_override(None);
    }

    world.resource_mut::<PointerCapture>().0 = false;
    world.resource_mut::<ScenePhase>().reset();

    let mut ledger = world.resource_mut::<MountLedger>();
    ledger.teardowns += 1;
    ledger.cameras_released += report.cameras;
    ledger.controls_released += report.controls;
    ledger.environments_released += report.environments;

    tracing::info!("Tore down cockpit scene {:?}: {:?}", previous, report);
}

pub fn attach_loaded_model(
    mut commands: Commands,
    mut finished: MessageReader<ModelLoadFinished>,
    active: Res<ActiveMount>,
    context: Option<Res<SceneContext>>,
    existing: Query<Entity, With<ModelRoot>>,
    mut phase: ResMut<ScenePhase>,
    mut ledger: ResMut<MountLedger>,
) {
    for message in finished.read() {
        let context = match context.as_deref() {
            Some(context) if active.is_current(message.mount) && context.mount == message.mount => context,
            _ => {
                tracing::debug!("Discarding model result for stale mount {:?}", message.mount);
                continue;
            }
        };

        if phase.get() != LifecyclePhase::Loading {
            tracing::debug!("Ignoring model result for {:?} in phase {:?}", message.mount, phase.get());
            continue;
        }

        match &message.result {
            Ok(asset) => {
                for old in &existing {
                    commands.entity(old).despawn();
                }
                let mut root = commands.spawn((
                    Name::new("Model Root"),
                    ModelRoot,
                    FramePending,
                    MountScoped(message.mount),
                    Transform::default(),
                    Visibility::Hidden,
                    ChildOf(context.world_group),
                ));
                if let ModelAsset::Scene(scene) = asset {
                    root.insert(SceneRoot(scene.clone()));
                }
            }
            Err(error) => {
                tracing::error!("{}", error);
                ledger.load_failures += 1;
                phase.fail(error.to_string());
            }
        }
    }
}

/// Normalize, reveal and aim the camera at a freshly attached model once its
/// scene instance has spawned
pub fn frame_attached_model(
    mut commands: Commands,
    pending: Query<(Entity, Option<&SceneRoot>, Option<&SceneInstance>), (With<ModelRoot>, With<FramePending>)>,
    scene_spawner: Option<Res<SceneSpawner>>,
    mut nodes: NodeQuery,
    mut visibility: Query<&mut Visibility, With<ModelRoot>>,
    mut cameras: Query<(&mut Transform, &mut OrbitControls), With<CockpitCamera>>,
    meshes: Res<Assets<Mesh>>,
    config: Res<ViewerConfig>,
    time: Res<Time>,
    mut phase: ResMut<ScenePhase>,
    mut hints: Option<ResMut<HintOverlay>>,
) {
    for (root, scene, instance) in &pending {
        if scene.is_some() {
            let ready = match (instance, scene_spawner.as_deref()) {
                (Some(instance), Some(spawner)) => spawner.instance_is_ready(**instance),
                _ => false,
            };
            if !ready {
                continue;
            }
        }

        let Some(bounds) = normalize_subtree(root, &mut nodes, &meshes, config.model.target_diagonal) else {
            continue;
        };

        let center = bounds.center();
        let eye = center + Vec3::from(config.framing.eye_offset);
        let look = center + Vec3::from(config.framing.look_offset);
        for (mut transform, mut controls) in &mut cameras {
            controls.set_view(&mut transform, eye, look);
        }

        if let Ok(mut visibility) = visibility.get_mut(root) {
            *visibility = Visibility::Inherited;
        }
        commands.entity(root).remove::<FramePending>();

        if phase.transition(LifecyclePhase::Ready) {
            tracing::info!(
                "Model framed: diagonal {:.3}, center {:?}",
                bounds.diagonal(),
                bounds.center()
            );
            if let Some(hints) = hints.as_mut() {
                hints.schedule_dismiss(time.elapsed_secs_f64(), config.hints.dismiss_after_secs);
            }
        }
    }
}

pub fn fit_viewport_to_window(
    windows: Query<&Window, With<PrimaryWindow>>,
    viewport: Option<ResMut<ViewportSize>>,
    mut cameras: Query<&mut Projection, With<CockpitCamera>>,
) {
    let (Ok(window), Some(mut viewport)) = (windows.single(), viewport) else {
        return;
    };
    let (width, height) = (window.width(), window.height());
    if viewport.width == width && viewport.height == height {
        return;
    }

    for mut projection in &mut cameras {
        if let Projection::Perspective(perspective) = projection.as_mut() {
            fit_projection(perspective, width, height);
        }
    }
    viewport.width = width;
    viewport.height = height;
}

pub fn handle_remount_requests(world: &mut World) {
    let requested = world.resource_mut::<Messages<RemountRequested>>().drain().count() > 0;
    if !requested {
        return;
    }

    tracing::info!("Remounting cockpit scene");
    teardown_scene(world);
    if let Err(e) = world.run_system_cached(mount_scene) {
        tracing::error!("Failed to remount cockpit scene: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use crate::CockpitScenePlugin;
    use bevy::input::InputPlugin;
    use bevy::state::app::StatesPlugin;

    #[derive(States, Debug, Clone, PartialEq, Eq, Hash, Default)]
    enum TestView {
        #[default]
        Away,
        Cockpit,
    }

    fn test_app() -> App {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, AssetPlugin::default(), StatesPlugin, InputPlugin));
        app.init_asset::<Image>();
        app.init_asset::<Mesh>();
        app.init_asset::<Scene>();
        app.init_state::<TestView>();
        app.add_plugins(CockpitScenePlugin::new(TestView::Cockpit, ViewerConfig::default()));
        app
    }

    fn go(app: &mut App, view: TestView) {
        app.world_mut().resource_mut::<NextState<TestView>>().set(view);
        app.update();
    }

    fn phase(app: &App) -> LifecyclePhase {
        app.world().resource::<ScenePhase>().get()
    }

    fn current_mount(app: &App) -> MountId {
        app.world().resource::<SceneContext>().mount
    }

    fn camera_count(app: &mut App) -> usize {
        app.world_mut()
            .query_filtered::<Entity, With<CockpitCamera>>()
            .iter(app.world())
            .count()
    }

    #[test]
    fn test_phase_transitions() {
        let mut phase = ScenePhase::default();
        assert!(!phase.transition(LifecyclePhase::Ready));
        assert!(phase.transition(LifecyclePhase::Loading));
        assert!(phase.fail("boom".to_string()));
        assert!(!phase.transition(LifecyclePhase::Ready));
        assert_eq!(phase.get(), LifecyclePhase::Error);
        phase.reset();
        assert_eq!(phase.get(), LifecyclePhase::Idle);
        assert!(phase.error.is_none());
    }

    #[test]
    fn test_fit_projection_exact_aspect() {
        let mut projection = PerspectiveProjection::default();
        assert!(fit_projection(&mut projection, 1280.0, 720.0));
        assert_eq!(projection.aspect_ratio, 1280.0 / 720.0);
        assert!(fit_projection(&mut projection, 333.0, 1000.0));
        assert_eq!(projection.aspect_ratio, 333.0 / 1000.0);

        // Collapsed surface keeps the last good aspect
        assert!(!fit_projection(&mut projection, 500.0, 0.0));
        assert_eq!(projection.aspect_ratio, 333.0 / 1000.0);
    }

    #[test]
    fn test_capped_scale_factor() {
        assert_eq!(capped_scale_factor(3.0, 2.0), Some(2.0));
        assert_eq!(capped_scale_factor(2.0, 2.0), None);
        assert_eq!(capped_scale_factor(1.0, 2.0), None);
    }

    #[test]
    fn test_mount_builds_context() {
        let mut app = test_app();
        assert_eq!(phase(&app), LifecyclePhase::Idle);

        go(&mut app, TestView::Cockpit);

        assert_eq!(phase(&app), LifecyclePhase::Loading);
        assert!(app.world().contains_resource::<SceneContext>());
        assert!(app.world().contains_resource::<InputState>());
        assert!(app.world().contains_resource::<HintOverlay>());
        assert_eq!(app.world().resource::<MountLedger>().mounts, 1);
        assert_eq!(camera_count(&mut app), 1);

        let context = app.world().resource::<SceneContext>();
        assert_eq!(context.lights.len(), 2);
        assert!(app.world().get::<OrbitControls>(context.camera).is_some());
    }

    #[test]
    fn test_unmount_before_load_resolves() {
        let mut app = test_app();
        go(&mut app, TestView::Cockpit);
        let mount = current_mount(&app);

        go(&mut app, TestView::Away);

        let ledger = app.world().resource::<MountLedger>().clone();
        assert_eq!(ledger.teardowns, 1);
        assert_eq!(ledger.cameras_released, 1);
        assert_eq!(ledger.controls_released, 1);
        assert_eq!(ledger.environments_released, 1);
        assert!(!app.world().contains_resource::<SceneContext>());
        assert!(!app.world().contains_resource::<InputState>());
        assert_eq!(phase(&app), LifecyclePhase::Idle);
        assert_eq!(camera_count(&mut app), 0);

        // The load for the old mount lands after teardown
        app.world_mut().write_message(ModelLoadFinished {
            mount,
            result: Ok(ModelAsset::Empty),
        });
        app.update();
        app.update();

        let roots = app
            .world_mut()
            .query_filtered::<Entity, With<ModelRoot>>()
            .iter(app.world())
            .count();
        assert_eq!(roots, 0);
        assert_eq!(phase(&app), LifecyclePhase::Idle);
        assert_eq!(app.world().resource::<MountLedger>().cameras_released, 1);
    }

    #[test]
    fn test_load_rejection_leaves_world_group_empty() {
        let mut app = test_app();
        go(&mut app, TestView::Cockpit);
        let mount = current_mount(&app);

        app.world_mut().write_message(ModelLoadFinished {
            mount,
            result: Err(LoadError::Transport {
                url: "/missing.glb".to_string(),
                reason: "404".to_string(),
            }),
        });
        app.update();

        assert_eq!(phase(&app), LifecyclePhase::Error);
        assert!(app.world().resource::<ScenePhase>().error.is_some());
        assert_eq!(app.world().resource::<MountLedger>().load_failures, 1);

        let group = app.world().resource::<SceneContext>().world_group;
        assert!(app.world().get::<Children>(group).is_none_or(|c| c.is_empty()));

        let camera = app.world().resource::<SceneContext>().camera;
        let before = *app.world().get::<Transform>(camera).unwrap();

        // A later success for the same mount cannot leave Error
        app.world_mut().write_message(ModelLoadFinished {
            mount,
            result: Ok(ModelAsset::Empty),
        });
        app.update();
        app.update();
        assert_eq!(phase(&app), LifecyclePhase::Error);
        assert!(app.world().get::<Children>(group).is_none_or(|c| c.is_empty()));
        let roots = app
            .world_mut()
            .query_filtered::<Entity, With<ModelRoot>>()
            .iter(app.world())
            .count();
        assert_eq!(roots, 0);
        assert_eq!(app.world().get::<Transform>(camera), Some(&before));
    }

    #[test]
    fn test_environment_cubemap_layout() {
        let image = environment_cubemap(Color::WHITE, Color::srgb(0.5, 0.5, 0.5), Color::BLACK);
        assert_eq!(image.texture_descriptor.size.depth_or_array_layers, 6);
        assert_eq!(
            image.texture_view_descriptor.as_ref().and_then(|view| view.dimension),
            Some(TextureViewDimension::Cube)
        );

        let data = image.data.as_deref().unwrap();
        assert_eq!(data.len(), 6 * 4);
        // +Y is sky, -Y is ground
        assert_eq!(&data[8..12], &[255, 255, 255, 255]);
        assert_eq!(&data[12..16], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_environment_released_on_teardown() {
        let mut app = test_app();
        go(&mut app, TestView::Cockpit);

        let (camera, handle) = {
            let context = app.world().resource::<SceneContext>();
            (context.camera, context.environment[0].clone())
        };
        assert!(app.world().resource::<Assets<Image>>().contains(&handle));
        let light = app.world().get::<EnvironmentMapLight>(camera).unwrap();
        assert_eq!(light.diffuse_map, handle);
        assert_eq!(light.intensity, ViewerConfig::default().render.environment_intensity);

        go(&mut app, TestView::Away);

        assert!(!app.world().resource::<Assets<Image>>().contains(&handle));
        assert_eq!(app.world().resource::<MountLedger>().environments_released, 1);
    }

    #[test]
    fn test_window_resize_refits_camera() {
        let mut app = test_app();
        app.world_mut().spawn((Window::default(), PrimaryWindow));
        go(&mut app, TestView::Cockpit);

        let camera = app.world().resource::<SceneContext>().camera;
        let aspect = |app: &App| match app.world().get::<Projection>(camera) {
            Some(Projection::Perspective(perspective)) => perspective.aspect_ratio,
            _ => panic!("cockpit camera lost its perspective projection"),
        };
        let (width, height) = {
            let viewport = app.world().resource::<ViewportSize>();
            (viewport.width, viewport.height)
        };
        assert_eq!(aspect(&app), width / height);

        for (w, h) in [(1000.0, 750.0), (437.0, 911.0)] {
            let mut windows = app.world_mut().query_filtered::<&mut Window, With<PrimaryWindow>>();
            windows.single_mut(app.world_mut()).unwrap().resolution.set(w, h);
            app.update();

            assert_eq!(aspect(&app), w / h);
            let viewport = app.world().resource::<ViewportSize>();
            assert_eq!((viewport.width, viewport.height), (w, h));
        }
    }

    #[test]
    fn test_empty_model_reaches_ready() {
        let mut app = test_app();
        go(&mut app, TestView::Cockpit);
        let mount = current_mount(&app);

        app.world_mut().write_message(ModelLoadFinished {
            mount,
            result: Ok(ModelAsset::Empty),
        });
        app.update();
        app.update();

        assert_eq!(phase(&app), LifecyclePhase::Ready);
        assert!(app.world().resource::<HintOverlay>().is_scheduled());

        let camera = app.world().resource::<SceneContext>().camera;
        let eye = Vec3::from(ViewerConfig::default().framing.eye_offset);
        let position = app.world().get::<Transform>(camera).unwrap().translation;
        assert!((position - eye).length() < 1e-3);
    }

    #[test]
    fn test_box_model_is_framed() {
        let mut app = test_app();
        go(&mut app, TestView::Cockpit);

        let (mount, group) = {
            let context = app.world().resource::<SceneContext>();
            (context.mount, context.world_group)
        };
        let mesh = app
            .world_mut()
            .resource_mut::<Assets<Mesh>>()
            .add(Cuboid::new(4.0, 4.0, 4.0));

        // Spans (-1,-1,-1)..(3,3,3)
        let root = app
            .world_mut()
            .spawn((
                ModelRoot,
                FramePending,
                MountScoped(mount),
                Transform::default(),
                Visibility::Hidden,
                ChildOf(group),
            ))
            .with_child((Transform::from_xyz(1.0, 1.0, 1.0), Mesh3d(mesh)))
            .id();
        app.update();

        assert_eq!(phase(&app), LifecyclePhase::Ready);
        assert_eq!(app.world().get::<Visibility>(root), Some(&Visibility::Inherited));
        assert!(app.world().get::<FramePending>(root).is_none());

        let bounds = app
            .world_mut()
            .run_system_cached_with(
                |In(root): In<Entity>, nodes: NodeQuery, meshes: Res<Assets<Mesh>>| {
                    crate::bounds::subtree_bounds(root, &nodes, &meshes)
                },
                root,
            )
            .unwrap();
        assert!(bounds.center().length() < 1e-4);
        assert!((bounds.diagonal() - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_retry_remounts() {
        let mut app = test_app();
        go(&mut app, TestView::Cockpit);
        let first = current_mount(&app);

        app.world_mut().write_message(RemountRequested);
        app.update();

        let ledger = app.world().resource::<MountLedger>().clone();
        assert_eq!(ledger.mounts, 2);
        assert_eq!(ledger.teardowns, 1);
        assert_eq!(phase(&app), LifecyclePhase::Loading);
        assert!(current_mount(&app) > first);
        assert_eq!(camera_count(&mut app), 1);
    }

    #[test]
    fn test_repeated_mounts_do_not_leak() {
        let mut app = test_app();
        for _ in 0..3 {
            go(&mut app, TestView::Cockpit);
            go(&mut app, TestView::Away);
        }

        let ledger = app.world().resource::<MountLedger>().clone();
        assert_eq!(ledger.mounts, 3);
        assert_eq!(ledger.teardowns, 3);
        assert_eq!(ledger.cameras_released, 3);
        assert_eq!(camera_count(&mut app), 0);
        let scoped = app
            .world_mut()
            .query::<&MountScoped>()
            .iter(app.world())
            .count();
        assert_eq!(scoped, 0);
    }
}
