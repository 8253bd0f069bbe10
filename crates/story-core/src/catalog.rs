//! Immutable lookup from event/arc identifier to authored definition.

use crate::{validate_arc, validate_event, ArcDefinition, ArcId, EventId, StoryEvent, ValidationError};
use std::collections::BTreeMap;

/// Validated content library. Catalog order (the order events were supplied
/// in) is the final tie-break of slot selection.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    events: Vec<StoryEvent>,
    index: BTreeMap<EventId, usize>,
    arcs: BTreeMap<ArcId, ArcDefinition>,
}

impl Catalog {
    /// Build a catalog, validating every definition and the cross-references
    /// between events and arcs. Follow-up references (`chain_event`,
    /// `schedule`) are not checked here; see [`Catalog::dangling_references`].
    pub fn new(events: Vec<StoryEvent>, arcs: Vec<ArcDefinition>) -> Result<Self, ValidationError> {
        let mut index = BTreeMap::new();
        for (pos, e) in events.iter().enumerate() {
            validate_event(e)?;
            if index.insert(e.id.clone(), pos).is_some() {
                return Err(ValidationError::DuplicateEvent(e.id.clone()));
            }
        }
        let mut arc_map = BTreeMap::new();
        for a in arcs {
            validate_arc(&a)?;
            if arc_map.contains_key(&a.id) {
                return Err(ValidationError::DuplicateArc(a.id.clone()));
            }
            arc_map.insert(a.id.clone(), a);
        }
        for arc in arc_map.values() {
            for (stage, s) in arc.stages.iter().enumerate() {
                for ev in &s.events {
                    if !index.contains_key(ev) {
                        return Err(ValidationError::ArcEventNotFound {
                            arc: arc.id.clone(),
                            stage,
                            event: ev.clone(),
                        });
                    }
                }
            }
        }
        for e in &events {
            if let Some(r) = &e.arc {
                let arc = arc_map.get(&r.arc).ok_or_else(|| ValidationError::UnknownArc {
                    event: e.id.clone(),
                    arc: r.arc.clone(),
                })?;
                if !arc.qualifies(r.stage, &e.id) {
                    return Err(ValidationError::StageMismatch {
                        event: e.id.clone(),
                        arc: r.arc.clone(),
                        stage: r.stage,
                    });
                }
            }
        }
        Ok(Self {
            events,
            index,
            arcs: arc_map,
        })
    }

    pub fn event(&self, id: &EventId) -> Option<&StoryEvent> {
        self.index.get(id).map(|&i| &self.events[i])
    }

    /// Position of an event in catalog order.
    pub fn position(&self, id: &EventId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// All events in catalog order.
    pub fn events(&self) -> &[StoryEvent] {
        &self.events
    }

    pub fn arc(&self, id: &ArcId) -> Option<&ArcDefinition> {
        self.arcs.get(id)
    }

    pub fn arcs(&self) -> impl Iterator<Item = &ArcDefinition> {
        self.arcs.values()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// `(source, target)` pairs where a follow-up points at an event the
    /// catalog does not contain. The engine tolerates these at runtime.
    pub fn dangling_references(&self) -> Vec<(EventId, EventId)> {
        let mut out = Vec::new();
        for e in &self.events {
            for c in &e.choices {
                for o in c.outcomes() {
                    let targets = o.chain_event.iter().chain(o.schedule.iter().map(|s| &s.event));
                    for t in targets {
                        if !self.index.contains_key(t) {
                            out.push((e.id.clone(), t.clone()));
                        }
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventChoice, EventConsequences, EventKind, Stakes};

    fn ev(id: &str) -> StoryEvent {
        StoryEvent::new(id, id, EventKind::Optional, Stakes::Low)
            .with_choice(EventChoice::new("ok", "Okay"))
    }

    #[test]
    fn lookup_preserves_catalog_order() {
        let cat = Catalog::new(vec![ev("b"), ev("a")], vec![]).unwrap();
        assert_eq!(cat.position(&EventId::from("b")), Some(0));
        assert_eq!(cat.position(&EventId::from("a")), Some(1));
        assert_eq!(cat.event(&EventId::from("a")).unwrap().id.as_str(), "a");
        assert!(cat.event(&EventId::from("zzz")).is_none());
    }

    #[test]
    fn duplicate_event_is_rejected() {
        let err = Catalog::new(vec![ev("a"), ev("a")], vec![]).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateEvent(EventId::from("a")));
    }

    #[test]
    fn arc_cross_references_are_checked() {
        let arc = ArcDefinition::new("rescue", "Rescue")
            .with_stage("open", vec![EventId::from("a")])
            .with_stage("close", vec![EventId::from("b")]);
        let ok = Catalog::new(
            vec![ev("a").with_arc("rescue", 0), ev("b").with_arc("rescue", 1)],
            vec![arc.clone()],
        );
        assert!(ok.is_ok());

        let wrong_stage = Catalog::new(
            vec![ev("a").with_arc("rescue", 1), ev("b")],
            vec![arc.clone()],
        );
        assert!(matches!(wrong_stage, Err(ValidationError::StageMismatch { .. })));

        let missing = Catalog::new(vec![ev("a")], vec![arc]);
        assert!(matches!(missing, Err(ValidationError::ArcEventNotFound { .. })));

        let unknown = Catalog::new(vec![ev("a").with_arc("nope", 0)], vec![]);
        assert!(matches!(unknown, Err(ValidationError::UnknownArc { .. })));
    }

    #[test]
    fn dangling_follow_ups_are_reported_not_rejected() {
        let choice = EventChoice::new("go", "Go")
            .with_success(EventConsequences::default().with_chain("ghost"));
        let e = StoryEvent::new("src", "Src", EventKind::Optional, Stakes::Low).with_choice(choice);
        let cat = Catalog::new(vec![e], vec![]).unwrap();
        assert_eq!(
            cat.dangling_references(),
            vec![(EventId::from("src"), EventId::from("ghost"))]
        );
    }
}
