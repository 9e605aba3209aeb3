//! Domain identifiers (strongly-typed IDs).
//!
//! publisher の façade が受け取る ID。ULID + Phantom type パターンで、
//! `ProjectId` と `IndexRouteId` をコンパイル時に混同できないようにする。
//!
//! wire 上は素の ULID 文字列として流れる（listener 側は具体型を知らなくても
//! `content` を比較・キー化できる）。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// Display で使うプレフィックス（例: "project-"）
    fn prefix() -> &'static str;
}

#[repr(transparent)]
#[derive(Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

// derive だと `T: Clone` を要求してしまうので手で書く
impl<T: IdMarker> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: IdMarker> Copy for Id<T> {}

impl<T: IdMarker> Id<T> {
    pub fn new() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> Default for Id<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Project のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Project {}

impl IdMarker for Project {
    fn prefix() -> &'static str {
        "project-"
    }
}

/// IndexRoute のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexRoute {}

impl IdMarker for IndexRoute {
    fn prefix() -> &'static str {
        "route-"
    }
}

/// Identifier of a project (lifecycle events on the project channel).
pub type ProjectId = Id<Project>;

/// Identifier of an index route (lifecycle events on the index-routing channel).
pub type IndexRouteId = Id<IndexRoute>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_marker_prefix() {
        let ulid = Ulid::new();
        assert_eq!(ProjectId::from_ulid(ulid).to_string(), format!("project-{ulid}"));
        assert_eq!(IndexRouteId::from_ulid(ulid).to_string(), format!("route-{ulid}"));
    }

    #[test]
    fn serializes_as_bare_ulid_string() {
        let ulid = Ulid::new();
        let id = ProjectId::from_ulid(ulid);

        let value = serde_json::to_value(id).unwrap();
        assert_eq!(value, serde_json::Value::String(ulid.to_string()));

        let back: ProjectId = serde_json::from_value(value).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<ProjectId>(), size_of::<Ulid>());
        assert_eq!(size_of::<IndexRouteId>(), size_of::<Ulid>());
    }
}
