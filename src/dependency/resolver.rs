use std::collections::HashSet;

use crate::catalog::DistObjectCatalog;
use crate::config::{PropagationConfig, DEBUG_DEPENDENCIES};
use crate::error::{DistError, DistResult};
use crate::host::LocalCatalog;
use crate::object::{classify, follow_policy, to_portable, FollowPolicy, ObjectAddress, ObjectReference};
use crate::{dist_debug, dist_info};

use super::{DependencyEdge, DependencyKind, DependencyStore};

/// One object being expanded on the explicit stack
struct Frame {
    address: ObjectAddress,
    /// `None` for the target itself, which is never part of the output
    object: Option<ObjectReference>,
    edges: Vec<DependencyEdge>,
    next: usize,
}

/// Builds the ordered list of objects that must exist before a target can be
/// created on another node
///
/// ALGORITHM:
/// 1. Start from the target's own dependency edges
/// 2. For each `Normal` edge, skip the referenced object when it is already
///    queued, owned by an extension, not a followed kind, or already distributed
/// 3. Otherwise expand the object's own edges first, then append it
///
/// The walk uses an explicit stack, so graph depth is bounded by
/// `max_dependency_depth` rather than the host call stack. Objects on the
/// stack are tracked as "visiting" and never pushed twice, which makes cycles
/// terminate.
pub struct DependencyResolver<'a> {
    local: &'a dyn LocalCatalog,
    store: &'a dyn DependencyStore,
    distributed: &'a dyn DistObjectCatalog,
    max_depth: usize,
    skip_distributed: bool,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(
        local: &'a dyn LocalCatalog,
        store: &'a dyn DependencyStore,
        distributed: &'a dyn DistObjectCatalog,
        config: &PropagationConfig,
    ) -> Self {
        Self {
            local,
            store,
            distributed,
            max_depth: config.max_dependency_depth,
            skip_distributed: true,
        }
    }

    /// Walk through objects already recorded as distributed instead of pruning them
    pub fn skip_distributed(mut self, skip: bool) -> Self {
        self.skip_distributed = skip;
        self
    }

    /// Ordered prerequisites of `target`, excluding the target itself
    ///
    /// # Errors
    /// Collaborator failures, `NotFound` when a dependency row points at a
    /// vanished object, `DependencyDepthExceeded` past the configured depth.
    pub fn resolve(&self, target: &ObjectReference) -> DistResult<Vec<ObjectReference>> {
        let root = target.address();
        let mut ordered = Vec::new();
        let mut queued: HashSet<ObjectAddress> = HashSet::new();
        let mut visiting: HashSet<ObjectAddress> = HashSet::new();

        visiting.insert(root);
        let mut stack = vec![Frame {
            address: root,
            object: None,
            edges: self.store.dependencies_of(&root)?,
            next: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            if frame.next >= frame.edges.len() {
                if let Some(done) = stack.pop() {
                    visiting.remove(&done.address);
                    if let Some(object) = done.object {
                        queued.insert(done.address);
                        ordered.push(object);
                    }
                }
                continue;
            }

            let edge = frame.edges[frame.next];
            frame.next += 1;

            let Some(candidate) = self.follow(&edge, &queued, &visiting)? else {
                continue;
            };

            if stack.len() >= self.max_depth {
                return Err(DistError::DependencyDepthExceeded {
                    depth: stack.len() + 1,
                    max_depth: self.max_depth,
                });
            }

            let address = candidate.address();
            visiting.insert(address);
            stack.push(Frame {
                address,
                object: Some(candidate),
                edges: self.store.dependencies_of(&address)?,
                next: 0,
            });
        }

        if DEBUG_DEPENDENCIES {
            dist_info!(
                "resolved {} prerequisite(s) for object {}",
                ordered.len(),
                root
            );
        }

        Ok(ordered)
    }

    /// Apply the follow/skip policy to one edge; `Some` means expand the object
    fn follow(
        &self,
        edge: &DependencyEdge,
        queued: &HashSet<ObjectAddress>,
        visiting: &HashSet<ObjectAddress>,
    ) -> DistResult<Option<ObjectReference>> {
        if edge.kind != DependencyKind::Normal {
            return Ok(None);
        }

        let candidate = edge.referenced;
        let whole = candidate.whole_object();
        if queued.contains(&candidate) || queued.contains(&whole) {
            return Ok(None);
        }
        if visiting.contains(&whole) {
            // back edge of a cycle; the object is already being expanded
            return Ok(None);
        }

        if self.store.is_owned_by_extension(&whole)? {
            return Ok(None);
        }

        let reference = classify(self.local, &candidate)?;
        if follow_policy(&reference) == FollowPolicy::NotFollowed {
            dist_debug!(
                "dependency {} of {} is not followed and will not be propagated",
                candidate,
                edge.dependent
            );
            return Ok(None);
        }

        if self.skip_distributed {
            let id = to_portable(self.local, &reference)?;
            if self.distributed.contains(&id)? {
                return Ok(None);
            }
        }

        Ok(Some(reference))
    }
}
