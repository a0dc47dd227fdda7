use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, error};

use crate::script::{ActorId, BackdropId, MusicId};
use crate::sprites::Clip;

pub const BACKDROP_DIR: &str = "backdrops";
pub const CHARACTER_DIR: &str = "characters";
pub const MUSIC_DIR: &str = "music";

/// Address of one asset under the asset root. The directory layout is shared
/// with the art pipeline and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKey {
    Backdrop(BackdropId),
    Sheet(ActorId, Clip),
    Music(MusicId),
}

impl AssetKey {
    pub fn relative_path(&self) -> PathBuf {
        match self {
            Self::Backdrop(id) => Path::new(BACKDROP_DIR).join(format!("{}.png", id.as_token())),
            Self::Sheet(actor, clip) => Path::new(CHARACTER_DIR)
                .join(actor.as_token())
                .join(format!("{}.png", clip.as_token())),
            Self::Music(id) => Path::new(MUSIC_DIR).join(format!("{}.mp3", id.as_token())),
        }
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backdrop(id) => write!(f, "{BACKDROP_DIR}/{}", id.as_token()),
            Self::Sheet(actor, clip) => {
                write!(f, "{CHARACTER_DIR}/{}/{}", actor.as_token(), clip.as_token())
            }
            Self::Music(id) => write!(f, "{MUSIC_DIR}/{}", id.as_token()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    #[error("failed to open {path}: {message}")]
    Open { path: PathBuf, message: String },
    #[error("failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },
    #[error("failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },
    #[error("asset {key} is not available")]
    Missing { key: String },
    #[error("failed to start loader for {key}: {message}")]
    Spawn { key: String, message: String },
    #[error("load of {key} was abandoned before it completed")]
    Abandoned { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Arc<[u8]>,
}

impl LoadedImage {
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            rgba: rgba.into(),
        })
    }

    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        let rgba = color
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect::<Vec<_>>();
        Self {
            width,
            height,
            rgba: rgba.into(),
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let bytes = self.rgba.get(offset..offset + 4)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    pub music: MusicId,
    pub path: PathBuf,
    pub bytes: Arc<[u8]>,
}

enum SlotState<T> {
    Pending(Receiver<Result<T, AssetError>>),
    Ready(T),
    Failed(AssetError),
}

/// Handle to an asset that may still be loading. Polling never blocks.
pub struct LoadSlot<T> {
    key: AssetKey,
    state: SlotState<T>,
}

/// Resolves the matching [`LoadSlot`] from wherever the load actually runs.
pub struct LoadCompleter<T> {
    key: AssetKey,
    sender: Sender<Result<T, AssetError>>,
}

impl<T> LoadCompleter<T> {
    pub fn key(&self) -> AssetKey {
        self.key
    }

    pub fn complete(self, result: Result<T, AssetError>) {
        // The slot's owner may already be gone; nothing is waiting then.
        let _ = self.sender.send(result);
    }
}

impl<T> LoadSlot<T> {
    pub fn pending(key: AssetKey) -> (Self, LoadCompleter<T>) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                key,
                state: SlotState::Pending(receiver),
            },
            LoadCompleter { key, sender },
        )
    }

    pub fn ready(key: AssetKey, value: T) -> Self {
        Self {
            key,
            state: SlotState::Ready(value),
        }
    }

    pub fn failed(key: AssetKey, reason: AssetError) -> Self {
        log_load_failure(key, &reason);
        Self {
            key,
            state: SlotState::Failed(reason),
        }
    }

    pub fn key(&self) -> AssetKey {
        self.key
    }

    pub fn poll(&mut self) -> Option<&T> {
        if let SlotState::Pending(receiver) = &self.state {
            let next = match receiver.try_recv() {
                Ok(Ok(value)) => {
                    debug!(asset = %self.key, "asset_loaded");
                    Some(SlotState::Ready(value))
                }
                Ok(Err(reason)) => {
                    log_load_failure(self.key, &reason);
                    Some(SlotState::Failed(reason))
                }
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => {
                    let reason = AssetError::Abandoned {
                        key: self.key.to_string(),
                    };
                    log_load_failure(self.key, &reason);
                    Some(SlotState::Failed(reason))
                }
            };
            if let Some(next) = next {
                self.state = next;
            }
        }
        self.get()
    }

    pub fn get(&self) -> Option<&T> {
        match &self.state {
            SlotState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self.state, SlotState::Pending(_))
    }

    pub fn failure(&self) -> Option<&AssetError> {
        match &self.state {
            SlotState::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

impl<T> fmt::Debug for LoadSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            SlotState::Pending(_) => "pending",
            SlotState::Ready(_) => "ready",
            SlotState::Failed(_) => "failed",
        };
        f.debug_struct("LoadSlot")
            .field("key", &self.key)
            .field("state", &state)
            .finish()
    }
}

fn log_load_failure(key: AssetKey, reason: &AssetError) {
    error!(asset = %key, error = %reason, "asset_load_failed");
}

/// Fire-and-forget asset requests. Implementations hand back a slot at once
/// and resolve it whenever the data is available.
pub trait AssetSource {
    fn request_image(&mut self, key: AssetKey) -> LoadSlot<LoadedImage>;
    fn request_audio(&mut self, music: MusicId) -> LoadSlot<AudioTrack>;
}

/// Loads from an asset directory on disk, one loader thread per request.
#[derive(Debug, Clone)]
pub struct FsAssetSource {
    root: PathBuf,
}

impl FsAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn spawn_load<T, F>(&self, key: AssetKey, load: F) -> LoadSlot<T>
    where
        T: Send + 'static,
        F: FnOnce(PathBuf) -> Result<T, AssetError> + Send + 'static,
    {
        let (slot, completer) = LoadSlot::pending(key);
        let path = self.root.join(key.relative_path());
        let spawned = thread::Builder::new()
            .name("asset-load".to_string())
            .spawn(move || completer.complete(load(path)));
        match spawned {
            Ok(_) => slot,
            Err(source) => LoadSlot::failed(
                key,
                AssetError::Spawn {
                    key: key.to_string(),
                    message: source.to_string(),
                },
            ),
        }
    }
}

impl AssetSource for FsAssetSource {
    fn request_image(&mut self, key: AssetKey) -> LoadSlot<LoadedImage> {
        self.spawn_load(key, |path| load_image_rgba(&path))
    }

    fn request_audio(&mut self, music: MusicId) -> LoadSlot<AudioTrack> {
        self.spawn_load(AssetKey::Music(music), move |path| {
            let bytes = fs::read(&path).map_err(|source| AssetError::Read {
                path: path.clone(),
                message: source.to_string(),
            })?;
            Ok(AudioTrack {
                music,
                path,
                bytes: bytes.into(),
            })
        })
    }
}

pub fn load_image_rgba(path: &Path) -> Result<LoadedImage, AssetError> {
    let reader = ImageReader::open(path).map_err(|source| AssetError::Open {
        path: path.to_path_buf(),
        message: source.to_string(),
    })?;
    let decoded = reader.decode().map_err(|source| AssetError::Decode {
        path: path.to_path_buf(),
        message: source.to_string(),
    })?;
    let image = decoded.to_rgba8();
    Ok(LoadedImage {
        width: image.width(),
        height: image.height(),
        rgba: image.into_raw().into(),
    })
}

enum MemoryEntry {
    Ready(LoadedImage),
    Deferred,
}

/// In-process asset table. Keys registered as deferred stay pending until
/// [`MemoryAssetSource::release`] is called; unknown keys fail immediately.
#[derive(Default)]
pub struct MemoryAssetSource {
    images: HashMap<AssetKey, MemoryEntry>,
    deferred: Vec<LoadCompleter<LoadedImage>>,
    music: HashMap<MusicId, Arc<[u8]>>,
}

impl MemoryAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_image(&mut self, key: AssetKey, image: LoadedImage) -> &mut Self {
        self.images.insert(key, MemoryEntry::Ready(image));
        self
    }

    /// Registers every clip of `actor` as a sheet with `frame_counts` frames
    /// (idle, walk, attack, death order).
    pub fn insert_actor_sheets(
        &mut self,
        actor: ActorId,
        frame_counts: [u32; 4],
        frame_width: u32,
        frame_height: u32,
    ) -> &mut Self {
        for (clip, frames) in Clip::ALL.into_iter().zip(frame_counts) {
            let image = LoadedImage::solid(frames * frame_width, frame_height, [200, 180, 90, 255]);
            self.insert_image(AssetKey::Sheet(actor, clip), image);
        }
        self
    }

    pub fn defer_image(&mut self, key: AssetKey) -> &mut Self {
        self.images.insert(key, MemoryEntry::Deferred);
        self
    }

    pub fn insert_music(&mut self, music: MusicId, bytes: Vec<u8>) -> &mut Self {
        self.music.insert(music, bytes.into());
        self
    }

    /// Completes every outstanding deferred load of `key` with `image`.
    pub fn release(&mut self, key: AssetKey, image: LoadedImage) -> usize {
        let mut released = 0;
        let mut kept = Vec::new();
        for completer in self.deferred.drain(..) {
            if completer.key() == key {
                completer.complete(Ok(image.clone()));
                released += 1;
            } else {
                kept.push(completer);
            }
        }
        self.deferred = kept;
        self.images.insert(key, MemoryEntry::Ready(image));
        released
    }

    /// Fails every outstanding deferred load of `key`.
    pub fn fail(&mut self, key: AssetKey) -> usize {
        let mut failed = 0;
        let mut kept = Vec::new();
        for completer in self.deferred.drain(..) {
            if completer.key() == key {
                completer.complete(Err(AssetError::Missing {
                    key: key.to_string(),
                }));
                failed += 1;
            } else {
                kept.push(completer);
            }
        }
        self.deferred = kept;
        self.images.remove(&key);
        failed
    }
}

impl AssetSource for MemoryAssetSource {
    fn request_image(&mut self, key: AssetKey) -> LoadSlot<LoadedImage> {
        match self.images.get(&key) {
            Some(MemoryEntry::Ready(image)) => LoadSlot::ready(key, image.clone()),
            Some(MemoryEntry::Deferred) => {
                let (slot, completer) = LoadSlot::pending(key);
                self.deferred.push(completer);
                slot
            }
            None => LoadSlot::failed(
                key,
                AssetError::Missing {
                    key: key.to_string(),
                },
            ),
        }
    }

    fn request_audio(&mut self, music: MusicId) -> LoadSlot<AudioTrack> {
        let key = AssetKey::Music(music);
        match self.music.get(&music) {
            Some(bytes) => LoadSlot::ready(
                key,
                AudioTrack {
                    music,
                    path: key.relative_path(),
                    bytes: Arc::clone(bytes),
                },
            ),
            None => LoadSlot::failed(
                key,
                AssetError::Missing {
                    key: key.to_string(),
                },
            ),
        }
    }
}
