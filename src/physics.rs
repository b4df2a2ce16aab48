//! Physics driver registry.
//!
//! Only the driver identity matters here; what a driver does to tanks is
//! someone else's business.

use std::fmt::{self, Display, Formatter};

use derive_more::From;
use serde::{Deserialize, Serialize};

use crate::wire::{DecodeError, Packer, Unpacker};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize, From)]
pub struct DriverId(pub u32);

impl DriverId {
    /// Drivers travel as `i32`, with `-1` meaning "no driver".
    pub fn pack_opt(id: Option<DriverId>, p: &mut Packer) {
        p.i32(id.map_or(-1, |d| d.0 as i32));
    }

    pub fn unpack_opt(u: &mut Unpacker) -> Result<Option<DriverId>, DecodeError> {
        let raw = u.i32()?;
        Ok(u32::try_from(raw).ok().map(DriverId))
    }
}

impl Display for DriverId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PhysicsDriverMgr {
    names: Vec<String>,
}

impl PhysicsDriverMgr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_driver(&mut self, name: impl Into<String>) -> DriverId {
        let name = name.into();
        if let Some(id) = self.find_driver(&name) {
            return id;
        }
        self.names.push(name);
        DriverId((self.names.len() - 1) as u32)
    }

    pub fn find_driver(&self, name: &str) -> Option<DriverId> {
        self.names.iter().position(|n| n == name).map(|i| DriverId(i as u32))
    }

    pub fn name(&self, id: DriverId) -> Option<&str> {
        self.names.get(id.0 as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_driver_by_name() {
        let mut mgr = PhysicsDriverMgr::new();
        let conveyor = mgr.add_driver("conveyor");
        let ice = mgr.add_driver("ice");
        assert_eq!(mgr.add_driver("conveyor"), conveyor);
        assert_eq!(mgr.find_driver("ice"), Some(ice));
        assert_eq!(mgr.find_driver("mud"), None);
        assert_eq!(mgr.name(ice), Some("ice"));
    }

    #[test]
    fn missing_driver_packs_as_minus_one() {
        let mut p = Packer::new();
        DriverId::pack_opt(None, &mut p);
        DriverId::pack_opt(Some(DriverId(3)), &mut p);
        assert_eq!(p.as_bytes(), &[0xff, 0xff, 0xff, 0xff, 0, 0, 0, 3]);

        let mut u = Unpacker::new(p.as_bytes());
        assert_eq!(DriverId::unpack_opt(&mut u).unwrap(), None);
        assert_eq!(DriverId::unpack_opt(&mut u).unwrap(), Some(DriverId(3)));
    }
}
