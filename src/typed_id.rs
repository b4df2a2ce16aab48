use std::fmt::{self, Debug, Display, Formatter};

use crate::obstacle::ObstacleType;

/// Addresses one obstacle in the world definition: its type in the upper 16
/// bits, its index in that type's list in the lower 16.
///
/// Ids are only meaningful for the world they were taken from; rebuilding or
/// sorting the world invalidates them.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObstacleId {
    kind: ObstacleType,
    index: u16,
}

impl ObstacleId {
    pub const fn new(kind: ObstacleType, index: u16) -> Self {
        ObstacleId { kind, index }
    }

    /// `None` if `index` does not fit in the id.
    pub fn from_index(kind: ObstacleType, index: usize) -> Option<Self> {
        Some(ObstacleId { kind, index: u16::try_from(index).ok()? })
    }

    pub const fn kind(self) -> ObstacleType {
        self.kind
    }

    pub const fn index(self) -> usize {
        self.index as usize
    }

    pub fn to_raw(self) -> u32 {
        (u32::from(self.kind.tag()) << 16) | u32::from(self.index)
    }

    /// Decodes a raw id. Unknown types give `None`; the index is not checked
    /// against any world here.
    pub fn from_raw(raw: u32) -> Option<Self> {
        let tag = u8::try_from(raw >> 16).ok()?;
        let kind = ObstacleType::from_tag(tag)?;
        Some(ObstacleId { kind, index: (raw & 0xffff) as u16 })
    }
}

impl From<ObstacleId> for u32 {
    fn from(id: ObstacleId) -> u32 {
        id.to_raw()
    }
}

impl Debug for ObstacleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ObstacleId<{}>({}) = {:#010x}", self.kind, self.index, self.to_raw())
    }
}

impl Display for ObstacleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.index)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(ObstacleType::Wall, 0, 0x0000_0000)]
    #[test_case(ObstacleType::Box, 3, 0x0001_0003)]
    #[test_case(ObstacleType::Tetra, 0xffff, 0x0009_ffff)]
    fn raw_layout(kind: ObstacleType, index: u16, raw: u32) {
        let id = ObstacleId::new(kind, index);
        assert_eq!(id.to_raw(), raw);
        assert_eq!(ObstacleId::from_raw(raw), Some(id));
    }

    #[test_case(0x000a_0000 ; "first unknown type")]
    #[test_case(0xffff_0001 ; "type past a byte")]
    fn unknown_types_do_not_decode(raw: u32) {
        assert_eq!(ObstacleId::from_raw(raw), None);
    }

    #[test]
    fn index_must_fit() {
        assert!(ObstacleId::from_index(ObstacleType::Box, 0x1_0000).is_none());
        assert_eq!(ObstacleId::from_index(ObstacleType::Box, 7).map(ObstacleId::index), Some(7));
    }
}
