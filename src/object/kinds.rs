//! Per-kind behavior table
//!
//! Every supported kind is described once here: how to name it, how to find
//! it by name, how to render it, and whether the dependency walk follows it.
//! Callers look the kind up instead of matching on it.

use crate::config::PropagationConfig;
use crate::deparse::{create, Statement};
use crate::error::DistResult;
use crate::host::LocalCatalog;

use super::codec;
use super::{ObjectKind, ObjectReference, Oid, QualifiedName};

/// Whether the dependency walk expands and propagates objects of a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowPolicy {
    Follow,
    NotFollowed,
}

pub struct KindBehavior {
    pub kind: ObjectKind,
    pub follow: FollowPolicy,
    /// Qualified name of the local object
    pub identify: fn(&dyn LocalCatalog, Oid) -> DistResult<QualifiedName>,
    /// Local oid for a parsed name
    pub lookup: fn(&dyn LocalCatalog, &QualifiedName) -> DistResult<Oid>,
    /// Statements that recreate the object on a worker
    pub render: fn(&dyn LocalCatalog, &PropagationConfig, Oid) -> DistResult<Vec<Statement>>,
    pub wrap: fn(Oid) -> ObjectReference,
}

static BEHAVIORS: [KindBehavior; 3] = [
    KindBehavior {
        kind: ObjectKind::Namespace,
        follow: FollowPolicy::Follow,
        identify: codec::identify_namespace,
        lookup: codec::lookup_namespace,
        render: create::render_namespace,
        wrap: ObjectReference::Namespace,
    },
    KindBehavior {
        kind: ObjectKind::EnumType,
        follow: FollowPolicy::Follow,
        identify: codec::identify_type,
        lookup: codec::lookup_enum,
        render: create::render_enum,
        wrap: ObjectReference::EnumType,
    },
    KindBehavior {
        kind: ObjectKind::CompositeType,
        follow: FollowPolicy::Follow,
        identify: codec::identify_type,
        lookup: codec::lookup_composite,
        render: create::render_composite,
        wrap: ObjectReference::CompositeType,
    },
];

/// Behavior for a kind; `None` for kinds the engine does not handle
pub fn behavior(kind: ObjectKind) -> Option<&'static KindBehavior> {
    BEHAVIORS.iter().find(|b| b.kind == kind)
}

/// Follow policy of a classified reference
pub fn follow_policy(reference: &ObjectReference) -> FollowPolicy {
    behavior(reference.kind())
        .map(|b| b.follow)
        .unwrap_or(FollowPolicy::NotFollowed)
}
