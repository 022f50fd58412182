//! The agent's view: a partial, eventually consistent cache of the entities
//! and components the simulation has streamed to this session.
//!
//! All mutation goes through the handful of operations on [`View`]. Every
//! operation tolerates redundant or out-of-order events, since the transport
//! does not promise exactly-once delivery at this layer. A component that has
//! never been observed reads as `None`; it is never replaced by a default.

use std::collections::HashMap;

use crate::{
    component::{Authority, ComponentData, ComponentKind, EntityId, TileData},
    math::Vec3,
};

/// One observed entity.
#[derive(Debug, Clone, Default)]
pub struct ViewEntity {
    components: HashMap<ComponentKind, ComponentData>,
    authority: HashMap<ComponentKind, Authority>,
}

impl ViewEntity {
    pub fn component(&self, kind: ComponentKind) -> Option<&ComponentData> {
        self.components.get(&kind)
    }

    pub fn authority(&self, kind: ComponentKind) -> Authority {
        self.authority.get(&kind).copied().unwrap_or_default()
    }

}

/// Result of an authority update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorityChange {
    pub previous: Authority,
    pub current: Authority,
}

impl AuthorityChange {
    /// Authority was held before this update and is not held anymore.
    pub fn lost(&self) -> bool {
        self.previous == Authority::Authoritative && self.current != Authority::Authoritative
    }

    pub fn gained(&self) -> bool {
        self.previous != Authority::Authoritative && self.current == Authority::Authoritative
    }
}

/// Owned entity/component cache.
#[derive(Debug, Default)]
pub struct View {
    entities: HashMap<EntityId, ViewEntity>,
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entity(&mut self, id: EntityId) {
        self.entities.entry(id).or_default();
    }

    /// Removes an entity and everything cached for it. Unknown ids are a no-op.
    pub fn remove_entity(&mut self, id: EntityId) -> bool {
        self.entities.remove(&id).is_some()
    }

    /// Replaces the stored data for the payload's kind. Returns `false` and
    /// stores nothing for unsupported payloads or entities that were never
    /// added (or were already removed).
    pub fn update_component(&mut self, id: EntityId, data: ComponentData) -> bool {
        let Some(kind) = data.kind() else {
            return false;
        };
        let Some(entity) = self.entities.get_mut(&id) else {
            return false;
        };
        entity.components.insert(kind, data);
        true
    }

    pub fn remove_component(&mut self, id: EntityId, kind: ComponentKind) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.components.remove(&kind);
        }
    }

    /// Overwrites the authority flag and reports the transition; `None` for
    /// entities that are not in the view.
    pub fn set_authority(
        &mut self,
        id: EntityId,
        kind: ComponentKind,
        authority: Authority,
    ) -> Option<AuthorityChange> {
        let entity = self.entities.get_mut(&id)?;
        let previous = entity
            .authority
            .insert(kind, authority)
            .unwrap_or_default();
        Some(AuthorityChange {
            previous,
            current: authority,
        })
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn component(&self, id: EntityId, kind: ComponentKind) -> Option<&ComponentData> {
        self.entities.get(&id)?.component(kind)
    }

    /// Authority for a component; [`Authority::Unassigned`] when nothing was
    /// reported or the entity is unknown.
    pub fn authority(&self, id: EntityId, kind: ComponentKind) -> Authority {
        self.entities
            .get(&id)
            .map(|e| e.authority(kind))
            .unwrap_or_default()
    }

    pub fn position(&self, id: EntityId) -> Option<Vec3> {
        match self.component(id, ComponentKind::Position)? {
            ComponentData::Position(p) => Some(*p),
            _ => None,
        }
    }

    pub fn tiles(&self, id: EntityId) -> Option<&TileData> {
        match self.component(id, ComponentKind::TilemapTiles)? {
            ComponentData::TilemapTiles(tiles) => Some(tiles),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Heartbeat;

    #[test]
    fn missing_component_reads_as_unknown() {
        let mut view = View::new();
        let id = EntityId(7);
        assert!(view.position(id).is_none());

        view.add_entity(id);
        assert!(view.contains(id));
        assert!(view.position(id).is_none());
        assert!(view.tiles(id).is_none());
    }

    #[test]
    fn present_but_empty_tiles_are_not_unknown() {
        let mut view = View::new();
        let id = EntityId(12);
        view.add_entity(id);
        view.update_component(id, ComponentData::TilemapTiles(TileData::default()));

        let tiles = view.tiles(id).expect("tiles were observed");
        assert!(tiles.is_empty());
    }

    #[test]
    fn redundant_events_are_idempotent() {
        let mut view = View::new();
        let id = EntityId(3);

        view.add_entity(id);
        view.update_component(id, ComponentData::Position(Vec3::new(1.0, 2.0, 0.0)));
        view.add_entity(id);
        assert_eq!(view.entity_count(), 1);
        assert_eq!(view.position(id), Some(Vec3::new(1.0, 2.0, 0.0)));

        assert!(view.remove_entity(id));
        assert!(!view.remove_entity(id));
        assert_eq!(view.entity_count(), 0);
    }

    #[test]
    fn update_overwrites_without_merging() {
        let mut view = View::new();
        let id = EntityId(5);
        view.add_entity(id);
        view.update_component(
            id,
            ComponentData::HeartbeatPong(Heartbeat {
                last_updated_time: Some(10),
            }),
        );
        view.update_component(id, ComponentData::HeartbeatPong(Heartbeat::default()));

        assert_eq!(
            view.component(id, ComponentKind::HeartbeatPong),
            Some(&ComponentData::HeartbeatPong(Heartbeat::default()))
        );
    }

    #[test]
    fn unsupported_payload_is_not_stored() {
        let mut view = View::new();
        view.add_entity(EntityId(1));
        assert!(!view.update_component(EntityId(1), ComponentData::Unsupported));
        assert!(view.component(EntityId(1), ComponentKind::Agent).is_none());
    }

    #[test]
    fn events_for_unknown_entities_do_not_create_them() {
        let mut view = View::new();
        let chunk = EntityId(12);
        view.add_entity(chunk);
        view.remove_entity(chunk);

        // A late update for the removed chunk must not bring it back.
        let tiles = ComponentData::TilemapTiles(TileData::uniform(100, 0, 0, 3));
        assert!(!view.update_component(chunk, tiles));
        assert!(view
            .set_authority(EntityId(77), ComponentKind::Agent, Authority::Authoritative)
            .is_none());

        assert!(!view.contains(chunk));
        assert!(view.tiles(chunk).is_none());
        assert!(!view.contains(EntityId(77)));
        assert_eq!(view.entity_count(), 0);
    }

    #[test]
    fn remove_component_keeps_entity() {
        let mut view = View::new();
        let id = EntityId(9);
        view.add_entity(id);
        view.update_component(id, ComponentData::Agent);
        view.remove_component(id, ComponentKind::Agent);
        view.remove_component(EntityId(404), ComponentKind::Agent);

        assert!(view.contains(id));
        assert!(view.component(id, ComponentKind::Agent).is_none());
    }

    #[test]
    fn authority_transitions_are_reported() {
        let mut view = View::new();
        let id = EntityId(40);
        view.add_entity(id);
        assert_eq!(view.authority(id, ComponentKind::Agent), Authority::Unassigned);

        let change = view
            .set_authority(id, ComponentKind::Agent, Authority::Authoritative)
            .unwrap();
        assert!(change.gained());
        assert!(!change.lost());

        let change = view
            .set_authority(id, ComponentKind::Agent, Authority::Authoritative)
            .unwrap();
        assert!(!change.gained());

        let change = view
            .set_authority(id, ComponentKind::Agent, Authority::NotAuthoritative)
            .unwrap();
        assert!(change.lost());
        assert_eq!(change.previous, Authority::Authoritative);
        assert_eq!(
            view.authority(id, ComponentKind::Agent),
            Authority::NotAuthoritative
        );
    }
}
