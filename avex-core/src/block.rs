use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Stimulus modality combination shared by every trial of a block
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockType {
    Audio,
    Animation,
    AudioAnimation,
}

impl BlockType {
    /// Presentation order used whenever block types are enumerated
    pub const ALL: [BlockType; 3] = [Self::Audio, Self::Animation, Self::AudioAnimation];

    /// Name used in property keys (`include{name}Block`) and playlist rows
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "Audio",
            Self::Animation => "Animation",
            Self::AudioAnimation => "AudioAnimation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    pub fn has_audio(&self) -> bool {
        matches!(self, Self::Audio | Self::AudioAnimation)
    }

    pub fn has_animation(&self) -> bool {
        matches!(self, Self::Animation | Self::AudioAnimation)
    }

    fn index(&self) -> usize {
        match self {
            Self::Audio => 0,
            Self::Animation => 1,
            Self::AudioAnimation => 2,
        }
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per block type, indexed by `BlockType`
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMap<T>([T; 3]);

impl<T> BlockMap<T> {
    pub fn from_fn(mut f: impl FnMut(BlockType) -> T) -> Self {
        Self([
            f(BlockType::Audio),
            f(BlockType::Animation),
            f(BlockType::AudioAnimation),
        ])
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlockType, &T)> {
        BlockType::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T> Index<BlockType> for BlockMap<T> {
    type Output = T;

    fn index(&self, ty: BlockType) -> &T {
        &self.0[ty.index()]
    }
}

impl<T> IndexMut<BlockType> for BlockMap<T> {
    fn index_mut(&mut self, ty: BlockType) -> &mut T {
        &mut self.0[ty.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_type_names_roundtrip() {
        for ty in BlockType::ALL {
            assert_eq!(BlockType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(BlockType::parse("Video"), None);
    }

    #[test]
    fn test_block_map_indexing() {
        let mut counts: BlockMap<usize> = BlockMap::default();
        counts[BlockType::Animation] += 2;
        counts[BlockType::AudioAnimation] += 1;
        assert_eq!(counts[BlockType::Audio], 0);
        assert_eq!(counts[BlockType::Animation], 2);
        let collected: Vec<_> = counts.iter().map(|(t, c)| (t, *c)).collect();
        assert_eq!(
            collected,
            vec![
                (BlockType::Audio, 0),
                (BlockType::Animation, 2),
                (BlockType::AudioAnimation, 1)
            ]
        );
    }

    #[test]
    fn test_modalities() {
        assert!(BlockType::Audio.has_audio());
        assert!(!BlockType::Audio.has_animation());
        assert!(BlockType::AudioAnimation.has_audio() && BlockType::AudioAnimation.has_animation());
    }
}
