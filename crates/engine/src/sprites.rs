use std::fmt;

use tracing::{debug, error};

use crate::assets::{AssetKey, AssetSource, LoadSlot, LoadedImage};
use crate::script::ActorId;

/// Width of one frame in every character sheet. Frame count is derived from
/// the sheet width.
pub const FRAME_WIDTH_PX: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Clip {
    #[default]
    Idle,
    Walk,
    Attack,
    Death,
}

impl Clip {
    pub const ALL: [Clip; 4] = [Self::Idle, Self::Walk, Self::Attack, Self::Death];

    pub fn as_token(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Walk => "walk",
            Self::Attack => "attack",
            Self::Death => "death",
        }
    }

    /// One-shot clips hold their last frame instead of looping.
    pub fn is_one_shot(self) -> bool {
        matches!(self, Self::Attack | Self::Death)
    }

    fn index(self) -> usize {
        match self {
            Self::Idle => 0,
            Self::Walk => 1,
            Self::Attack => 2,
            Self::Death => 3,
        }
    }
}

impl fmt::Display for Clip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteSheet {
    pub image: LoadedImage,
    pub frame_width: u32,
    pub frame_count: u32,
}

impl SpriteSheet {
    pub fn from_image(image: LoadedImage, frame_width: u32) -> Option<Self> {
        if frame_width == 0 || image.height == 0 {
            return None;
        }
        let frame_count = image.width / frame_width;
        if frame_count == 0 {
            return None;
        }
        Some(Self {
            image,
            frame_width,
            frame_count,
        })
    }

    pub fn frame_height(&self) -> u32 {
        self.image.height
    }

    pub fn last_frame(&self) -> u32 {
        self.frame_count.saturating_sub(1)
    }
}

#[derive(Debug)]
struct ClipSlot {
    load: LoadSlot<LoadedImage>,
    sheet: Option<SpriteSheet>,
    settled: bool,
}

impl ClipSlot {
    fn poll(&mut self, frame_width: u32) {
        if self.settled {
            return;
        }
        let key = self.load.key();
        if let Some(image) = self.load.poll() {
            let (width, height) = (image.width, image.height);
            self.sheet = SpriteSheet::from_image(image.clone(), frame_width);
            if let Some(sheet) = &self.sheet {
                debug!(asset = %key, frame_count = sheet.frame_count, "sprite_sheet_ready");
            } else {
                error!(
                    asset = %key,
                    width,
                    height,
                    frame_width,
                    "sprite_sheet_narrower_than_one_frame"
                );
            }
        }
        self.settled = self.load.is_settled();
    }
}

/// The four clips of one actor. Loads resolve in the background; callers poll
/// once per tick and treat absent clips as unavailable rather than an error.
#[derive(Debug)]
pub struct SpriteAnimationSet {
    actor: ActorId,
    frame_width: u32,
    clips: [ClipSlot; 4],
}

impl SpriteAnimationSet {
    pub fn request(actor: ActorId, assets: &mut dyn AssetSource) -> Self {
        Self::request_with_frame_width(actor, assets, FRAME_WIDTH_PX)
    }

    pub fn request_with_frame_width(
        actor: ActorId,
        assets: &mut dyn AssetSource,
        frame_width: u32,
    ) -> Self {
        let clips = Clip::ALL.map(|clip| ClipSlot {
            load: assets.request_image(AssetKey::Sheet(actor, clip)),
            sheet: None,
            settled: false,
        });
        let mut set = Self {
            actor,
            frame_width,
            clips,
        };
        set.poll();
        set
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn poll(&mut self) {
        let frame_width = self.frame_width;
        for slot in &mut self.clips {
            slot.poll(frame_width);
        }
    }

    /// True once every clip has either loaded or failed for good.
    pub fn is_ready(&self) -> bool {
        self.clips.iter().all(|slot| slot.settled)
    }

    pub fn sheet(&self, clip: Clip) -> Option<&SpriteSheet> {
        self.clips[clip.index()].sheet.as_ref()
    }

    pub fn frame_count(&self, clip: Clip) -> Option<u32> {
        self.sheet(clip).map(|sheet| sheet.frame_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssetSource;

    #[test]
    fn frame_count_comes_from_sheet_width() {
        let sheet = SpriteSheet::from_image(LoadedImage::solid(700, 100, [0, 0, 0, 255]), 100)
            .expect("sheet");
        assert_eq!(sheet.frame_count, 7);
        assert_eq!(sheet.last_frame(), 6);
        assert!(SpriteSheet::from_image(LoadedImage::solid(60, 100, [0; 4]), 100).is_none());
    }

    #[test]
    fn only_attack_and_death_are_one_shot() {
        assert!(!Clip::Idle.is_one_shot());
        assert!(!Clip::Walk.is_one_shot());
        assert!(Clip::Attack.is_one_shot());
        assert!(Clip::Death.is_one_shot());
    }

    #[test]
    fn set_is_ready_once_all_loads_settle() {
        let mut source = MemoryAssetSource::new();
        source.insert_actor_sheets(ActorId::Archer, [5, 7, 6, 4], FRAME_WIDTH_PX, 100);
        source.defer_image(AssetKey::Sheet(ActorId::Archer, Clip::Death));

        let mut set = SpriteAnimationSet::request(ActorId::Archer, &mut source);
        assert!(!set.is_ready());
        assert_eq!(set.frame_count(Clip::Walk), Some(7));
        assert_eq!(set.frame_count(Clip::Death), None);

        source.release(
            AssetKey::Sheet(ActorId::Archer, Clip::Death),
            LoadedImage::solid(400, 100, [1, 1, 1, 255]),
        );
        set.poll();
        assert!(set.is_ready());
        assert_eq!(set.frame_count(Clip::Death), Some(4));
    }

    #[test]
    fn failed_clip_stays_absent_but_set_becomes_ready() {
        let mut source = MemoryAssetSource::new();
        source.insert_image(
            AssetKey::Sheet(ActorId::Orc, Clip::Idle),
            LoadedImage::solid(500, 100, [0, 0, 0, 255]),
        );

        let set = SpriteAnimationSet::request(ActorId::Orc, &mut source);
        assert!(set.is_ready());
        assert!(set.sheet(Clip::Idle).is_some());
        assert!(set.sheet(Clip::Walk).is_none());
        assert!(set.sheet(Clip::Death).is_none());
    }
}
