//! Asynchronous glTF model loading

use bevy::asset::{AssetLoadError, LoadState, RecursiveDependencyLoadState};
use bevy::gltf::{Gltf, GltfLoaderSettings};
use bevy::prelude::*;

use crate::config::ViewerConfig;
use crate::error::{DecoderUnavailable, LoadError};
use crate::lifecycle::MountId;

pub const DRACO_EXTENSION: &str = "KHR_draco_mesh_compression";
pub const MESHOPT_EXTENSION: &str = "EXT_meshopt_compression";

/// Mesh compression extensions the glTF loader has no decoder for
pub const COMPRESSION_EXTENSIONS: [&str; 2] = [DRACO_EXTENSION, MESHOPT_EXTENSION];

/// Host-configured location of the Draco decoder assets.
///
/// This is configuration only. The glTF loader decodes neither Draco nor
/// Meshopt, so a model that requires either fails with
/// [`LoadError::MissingDecoder`] whatever is configured here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DracoCapability {
    path: String,
}

impl DracoCapability {
    /// Accepts an absolute path or URL naming a directory
    pub fn new(path: &str) -> Result<Self, DecoderUnavailable> {
        let path = path.trim();
        if path.is_empty() {
            return Err(DecoderUnavailable::EmptyPath);
        }
        let absolute = path.starts_with('/')
            || path.starts_with("http://")
            || path.starts_with("https://");
        if !absolute {
            return Err(DecoderUnavailable::RelativePath(path.to_string()));
        }
        if !path.ends_with('/') {
            return Err(DecoderUnavailable::NotADirectory(path.to_string()));
        }
        Ok(Self {
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Host asked for Meshopt support
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshoptCapability;

/// Decoder configuration captured for one load request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderCapabilities {
    pub draco: Option<DracoCapability>,
    pub meshopt: Option<MeshoptCapability>,
}

impl DecoderCapabilities {
    /// Capture whatever the config allows. A bad Draco path is logged and
    /// left out.
    pub fn resolve(config: &ViewerConfig) -> Self {
        let draco = match config.model.draco_path.as_deref() {
            Some(path) => match DracoCapability::new(path) {
                Ok(capability) => Some(capability),
                Err(e) => {
                    tracing::warn!("Ignoring Draco decoder path: {}", e);
                    None
                }
            },
            None => None,
        };
        let meshopt = config.model.meshopt.then_some(MeshoptCapability);
        Self { draco, meshopt }
    }

    /// Whether the host configured a decoder for the named extension
    pub fn configured(&self, extension: &str) -> bool {
        match extension {
            DRACO_EXTENSION => self.draco.is_some(),
            MESHOPT_EXTENSION => self.meshopt.is_some(),
            _ => false,
        }
    }
}

/// First mesh compression extension among `required`, if any
pub fn required_compression<'a>(required: impl IntoIterator<Item = &'a str>) -> Option<&'static str> {
    required
        .into_iter()
        .find_map(|name| COMPRESSION_EXTENSIONS.into_iter().find(|ext| *ext == name))
}

fn missing_decoder(url: &str, extension: &str, capabilities: &DecoderCapabilities) -> LoadError {
    if capabilities.configured(extension) {
        tracing::warn!("{} is configured but the glTF loader cannot decode it", extension);
    }
    LoadError::MissingDecoder {
        url: url.to_string(),
        extension: extension.to_string(),
    }
}

/// Result of a successful load
#[derive(Debug, Clone, PartialEq)]
pub enum ModelAsset {
    /// The default scene of the file, else its first scene
    Scene(Handle<Scene>),
    /// The file parsed but contains no scene
    Empty,
}

impl ModelAsset {
    pub fn from_scenes(default_scene: Option<&Handle<Scene>>, scenes: &[Handle<Scene>]) -> Self {
        match default_scene.or_else(|| scenes.first()) {
            Some(scene) => ModelAsset::Scene(scene.clone()),
            None => ModelAsset::Empty,
        }
    }
}

/// Ask the loader for the model of `mount`
#[derive(Message, Debug, Clone)]
pub struct ModelLoadRequested {
    pub mount: MountId,
    pub url: String,
}

/// Outcome of a [`ModelLoadRequested`]
#[derive(Message, Debug, Clone)]
pub struct ModelLoadFinished {
    pub mount: MountId,
    pub result: Result<ModelAsset, LoadError>,
}

/// Map a loader failure onto [`LoadError`]
pub fn classify_failure(url: &str, transport: bool, message: &str, capabilities: &DecoderCapabilities) -> LoadError {
    if transport {
        return LoadError::Transport {
            url: url.to_string(),
            reason: message.to_string(),
        };
    }
    if let Some(extension) = COMPRESSION_EXTENSIONS.into_iter().find(|ext| message.contains(ext)) {
        return missing_decoder(url, extension, capabilities);
    }
    LoadError::Parse {
        url: url.to_string(),
        reason: message.to_string(),
    }
}

fn classify_asset_error(url: &str, error: &AssetLoadError, capabilities: &DecoderCapabilities) -> LoadError {
    let transport = matches!(error, AssetLoadError::AssetReaderError(_));
    classify_failure(url, transport, &error.to_string(), capabilities)
}

/// Turn a fully loaded glTF into a [`ModelAsset`], rejecting files whose
/// meshes need a decoder the loader lacks
pub fn resolve_loaded(url: &str, gltf: &Gltf, capabilities: &DecoderCapabilities) -> Result<ModelAsset, LoadError> {
    let required = gltf
        .source
        .as_ref()
        .and_then(|source| required_compression(source.extensions_required()));
    match required {
        Some(extension) => Err(missing_decoder(url, extension, capabilities)),
        None => Ok(ModelAsset::from_scenes(gltf.default_scene.as_ref(), &gltf.scenes)),
    }
}

struct InFlightLoad {
    mount: MountId,
    url: String,
    handle: Handle<Gltf>,
    capabilities: DecoderCapabilities,
    started_at: f64,
}

/// Loads that have been issued but not yet published
#[derive(Resource, Default)]
pub struct InFlightLoads {
    loads: Vec<InFlightLoad>,
}

impl InFlightLoads {
    pub fn len(&self) -> usize {
        self.loads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loads.is_empty()
    }
}

/// Plugin that drives model loads through the asset server
pub struct ModelLoaderPlugin;

impl Plugin for ModelLoaderPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<InFlightLoads>()
            .add_message::<ModelLoadRequested>()
            .add_message::<ModelLoadFinished>()
            .add_systems(Update, (start_model_loads, poll_model_loads).chain());
    }
}

fn start_model_loads(
    mut requests: MessageReader<ModelLoadRequested>,
    mut in_flight: ResMut<InFlightLoads>,
    asset_server: Res<AssetServer>,
    config: Res<ViewerConfig>,
    time: Res<Time>,
) {
    for request in requests.read() {
        let capabilities = DecoderCapabilities::resolve(&config);
        tracing::info!("Loading model {}", request.url);
        tracing::debug!("Decoder config for {}: {:?}", request.url, capabilities);

        // The viewer owns the camera and lighting rig. The source document is
        // kept so required extensions can be checked.
        let handle = asset_server.load_with_settings::<Gltf, GltfLoaderSettings>(
            request.url.clone(),
            |settings: &mut GltfLoaderSettings| {
                settings.load_cameras = false;
                settings.load_lights = false;
                settings.include_source = true;
            },
        );

        in_flight.loads.push(InFlightLoad {
            mount: request.mount,
            url: request.url.clone(),
            handle,
            capabilities,
            started_at: time.elapsed_secs_f64(),
        });
    }
}

fn poll_model_loads(
    mut in_flight: ResMut<InFlightLoads>,
    mut finished: MessageWriter<ModelLoadFinished>,
    asset_server: Res<AssetServer>,
    gltf_assets: Res<Assets<Gltf>>,
    config: Res<ViewerConfig>,
    time: Res<Time>,
) {
    let now = time.elapsed_secs_f64();
    let timeout = config.model.load_timeout_secs;

    in_flight.loads.retain(|load| {
        let result = match asset_server.get_load_state(load.handle.id()) {
            Some(LoadState::Failed(error)) => Some(Err(classify_asset_error(&load.url, &error, &load.capabilities))),
            Some(LoadState::Loaded) => {
                match asset_server.get_recursive_dependency_load_state(load.handle.id()) {
                    Some(RecursiveDependencyLoadState::Failed(error)) => {
                        Some(Err(classify_asset_error(&load.url, &error, &load.capabilities)))
                    }
                    Some(RecursiveDependencyLoadState::Loaded) => Some(match gltf_assets.get(&load.handle) {
                        Some(gltf) => resolve_loaded(&load.url, gltf, &load.capabilities),
                        None => Err(LoadError::Parse {
                            url: load.url.clone(),
                            reason: "asset reported loaded but is missing".to_string(),
                        }),
                    }),
                    _ => None,
                }
            }
            _ => None,
        };

        let result = result.or_else(|| match timeout {
            Some(secs) if now - load.started_at > f64::from(secs) => Some(Err(LoadError::TimedOut {
                url: load.url.clone(),
                secs,
            })),
            _ => None,
        });

        match result {
            Some(result) => {
                if let Ok(asset) = &result {
                    tracing::info!("Model loaded: {} ({:?})", load.url, asset_kind(asset));
                }
                finished.write(ModelLoadFinished {
                    mount: load.mount,
                    result,
                });
                false
            }
            None => true,
        }
    });
}

fn asset_kind(asset: &ModelAsset) -> &'static str {
    match asset {
        ModelAsset::Scene(_) => "scene",
        ModelAsset::Empty => "empty",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::gltf::GltfPlugin;
    use bevy::time::TimeUpdateStrategy;
    use std::time::Duration;

    #[derive(Resource, Default)]
    struct Finished(Vec<ModelLoadFinished>);

    fn collect_finished(mut reader: MessageReader<ModelLoadFinished>, mut finished: ResMut<Finished>) {
        finished.0.extend(reader.read().cloned());
    }

    fn loader_app(config: ViewerConfig) -> App {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, AssetPlugin::default()))
            .insert_resource(config)
            .init_resource::<Finished>()
            .add_plugins(ModelLoaderPlugin)
            .add_systems(Update, collect_finished.after(poll_model_loads));
        app
    }

    /// Run frames until the loader publishes something
    fn run_until_finished(app: &mut App) -> ModelLoadFinished {
        for _ in 0..500 {
            app.update();
            if let Some(finished) = app.world_mut().resource_mut::<Finished>().0.pop() {
                return finished;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("model load never finished");
    }

    fn request(app: &mut App, mount: u64, url: &str) {
        app.world_mut().write_message(ModelLoadRequested {
            mount: MountId(mount),
            url: url.to_string(),
        });
    }

    #[test]
    fn test_draco_path_rules() {
        assert!(DracoCapability::new("/draco/gltf/").is_ok());
        assert!(DracoCapability::new("https://cdn.example.com/draco/").is_ok());
        assert_eq!(DracoCapability::new("  "), Err(DecoderUnavailable::EmptyPath));
        assert!(matches!(
            DracoCapability::new("draco/gltf/"),
            Err(DecoderUnavailable::RelativePath(_))
        ));
        assert!(matches!(
            DracoCapability::new("/draco/gltf"),
            Err(DecoderUnavailable::NotADirectory(_))
        ));
    }

    #[test]
    fn test_resolve_defaults() {
        let capabilities = DecoderCapabilities::resolve(&ViewerConfig::default());
        assert_eq!(capabilities.draco.as_ref().map(DracoCapability::path), Some("/draco/gltf/"));
        assert!(capabilities.meshopt.is_some());
    }

    #[test]
    fn test_resolve_bad_draco_path_is_not_fatal() {
        let mut config = ViewerConfig::default();
        config.model.draco_path = Some("decoders".to_string());
        config.model.meshopt = false;

        let capabilities = DecoderCapabilities::resolve(&config);
        assert!(capabilities.draco.is_none());
        assert!(capabilities.meshopt.is_none());
        assert!(!capabilities.configured(DRACO_EXTENSION));
        assert!(!capabilities.configured("KHR_materials_clearcoat"));
    }

    #[test]
    fn test_required_compression() {
        assert_eq!(
            required_compression(["KHR_materials_clearcoat", MESHOPT_EXTENSION]),
            Some(MESHOPT_EXTENSION)
        );
        assert_eq!(required_compression([DRACO_EXTENSION]), Some(DRACO_EXTENSION));
        assert_eq!(required_compression(["KHR_texture_transform"]), None);
        assert_eq!(required_compression(std::iter::empty()), None);
    }

    #[test]
    fn test_classify_transport() {
        let error = classify_failure("/m.glb", true, "Path not found: /m.glb", &DecoderCapabilities::default());
        assert!(matches!(error, LoadError::Transport { .. }));
        assert_eq!(error.url(), "/m.glb");
    }

    #[test]
    fn test_classify_missing_decoder() {
        let message = "extensionsRequired[0] = \"KHR_draco_mesh_compression\": Unsupported extension";
        let expected = LoadError::MissingDecoder {
            url: "/m.glb".to_string(),
            extension: DRACO_EXTENSION.to_string(),
        };

        let error = classify_failure("/m.glb", false, message, &DecoderCapabilities::default());
        assert_eq!(error, expected);

        // Configuring a decoder path does not make the file loadable
        let capabilities = DecoderCapabilities::resolve(&ViewerConfig::default());
        assert!(capabilities.configured(DRACO_EXTENSION));
        let error = classify_failure("/m.glb", false, message, &capabilities);
        assert_eq!(error, expected);

        let error = classify_failure("/m.glb", false, "needs EXT_meshopt_compression", &capabilities);
        assert!(matches!(error, LoadError::MissingDecoder { ref extension, .. } if extension == MESHOPT_EXTENSION));
    }

    #[test]
    fn test_classify_parse() {
        let error = classify_failure("/m.glb", false, "invalid glTF header", &DecoderCapabilities::default());
        assert!(matches!(error, LoadError::Parse { ref reason, .. } if reason == "invalid glTF header"));
    }

    #[test]
    fn test_scene_selection() {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, AssetPlugin::default()));
        app.init_asset::<Scene>();

        let mut scenes = app.world_mut().resource_mut::<Assets<Scene>>();
        let first = scenes.add(Scene::new(World::new()));
        let second = scenes.add(Scene::new(World::new()));
        let all = vec![first.clone(), second.clone()];

        assert_eq!(
            ModelAsset::from_scenes(Some(&second), &all),
            ModelAsset::Scene(second)
        );
        assert_eq!(ModelAsset::from_scenes(None, &all), ModelAsset::Scene(first));
        assert_eq!(ModelAsset::from_scenes(None, &[]), ModelAsset::Empty);
    }

    #[test]
    fn test_missing_file_is_transport_error() {
        let mut app = loader_app(ViewerConfig::default());
        app.add_plugins(GltfPlugin::default());
        // Registers the glTF loader
        app.finish();
        app.cleanup();
        request(&mut app, 7, "models/does-not-exist.glb");

        let finished = run_until_finished(&mut app);
        assert_eq!(finished.mount, MountId(7));
        assert!(
            matches!(finished.result, Err(LoadError::Transport { ref url, .. }) if url == "models/does-not-exist.glb"),
            "unexpected result {:?}",
            finished.result
        );
        assert!(app.world().resource::<InFlightLoads>().is_empty());
    }

    #[test]
    fn test_gltf_without_scenes_loads_empty() {
        let mut app = loader_app(ViewerConfig::default());
        app.add_plugins(GltfPlugin::default());
        // Registers the glTF loader
        app.finish();
        app.cleanup();
        request(&mut app, 3, "models/empty.gltf");

        let finished = run_until_finished(&mut app);
        assert_eq!(finished.mount, MountId(3));
        assert_eq!(finished.result, Ok(ModelAsset::Empty));
    }

    #[test]
    fn test_stalled_load_times_out() {
        let mut config = ViewerConfig::default();
        config.model.load_timeout_secs = Some(1.0);
        let mut app = loader_app(config);
        app.init_asset::<Gltf>()
            .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_millis(100)));

        // A handle the asset server knows nothing about never resolves
        app.world_mut().resource_mut::<InFlightLoads>().loads.push(InFlightLoad {
            mount: MountId(2),
            url: "/slow.glb".to_string(),
            handle: Handle::default(),
            capabilities: DecoderCapabilities::default(),
            started_at: 0.0,
        });

        for _ in 0..5 {
            app.update();
        }
        assert!(app.world().resource::<Finished>().0.is_empty());
        assert_eq!(app.world().resource::<InFlightLoads>().len(), 1);

        for _ in 0..10 {
            app.update();
        }
        let finished = app.world().resource::<Finished>();
        assert_eq!(finished.0.len(), 1);
        assert_eq!(finished.0[0].mount, MountId(2));
        assert_eq!(
            finished.0[0].result,
            Err(LoadError::TimedOut {
                url: "/slow.glb".to_string(),
                secs: 1.0,
            })
        );
        assert!(app.world().resource::<InFlightLoads>().is_empty());
    }
}
