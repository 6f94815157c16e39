//! # Dependency/phase ordering of a deferred batch.
//!
//! This is deliberately *not* a general topological sort: startup phase must
//! participate in ordering when two artifacts have no dependency relation,
//! so the batch is sorted by a fixed-point bubble pass instead. Each pass
//! scans all pairs (i, j) and swaps when j depends on i but sits after it,
//! or when phases outrank with no dependency either way; the loop ends when
//! a full pass produces no swap.
//!
//! A pair where each transitively depends on the other is a detected cycle:
//! it is warned about exactly once and never swapped, which breaks the
//! potential infinite loop. A configurable pass ceiling (default n² + 1)
//! guarantees termination even under pathological inputs.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::warn;

use crate::artifacts::Repository;
use crate::artifacts::StartPhase;
use crate::lifecycle::LifecycleEvent;

/// Orders the batch in place; returns the cycle warnings (one per pair).
///
/// Missing or unresolved node ids get an empty reference closure and a
/// logged warning; they never fail the ordering.
pub(crate) fn order_batch(
    repository: &dyn Repository,
    events: &mut [LifecycleEvent],
    scan_cap: Option<usize>,
) -> Vec<String> {
    let n = events.len();
    if n < 2 {
        return Vec::new();
    }

    let closures: HashMap<String, HashSet<String>> = events
        .iter()
        .map(|ev| {
            (
                ev.node_id.clone(),
                transitive_references(repository, &ev.node_id),
            )
        })
        .collect();

    let phase_of = |id: &str| -> StartPhase {
        repository
            .resolve(id)
            .map(|a| a.phase())
            .unwrap_or_default()
    };

    let cap = scan_cap.unwrap_or(n * n + 1);
    let mut warnings = BTreeSet::new();
    let mut passes = 0usize;
    let mut changed = true;

    'sorting: while changed {
        if passes >= cap {
            warn!(passes, "lifecycle ordering hit its pass ceiling, keeping current order");
            break;
        }
        passes += 1;
        changed = false;

        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let id_i = &events[i].node_id;
                let id_j = &events[j].node_id;
                let i_depends_on_j = closures[id_i].contains(id_j);
                let j_depends_on_i = closures[id_j].contains(id_i);

                if i_depends_on_j && j_depends_on_i {
                    // one warning per pair, not one per direction
                    let (a, b) = if id_i < id_j { (id_i, id_j) } else { (id_j, id_i) };
                    warnings.insert(format!("Found circular reference between: {a} and {b}"));
                    continue;
                }

                // phases only break ties between unrelated nodes
                let (phase_i, phase_j) = if !i_depends_on_j && !j_depends_on_i {
                    (phase_of(id_i), phase_of(id_j))
                } else {
                    (StartPhase::Normal, StartPhase::Normal)
                };

                if (i_depends_on_j && i < j)
                    || (j_depends_on_i && j < i)
                    || (i < j && phase_i > phase_j)
                    || (i > j && phase_j > phase_i)
                {
                    events.swap(i, j);
                    changed = true;
                    continue 'sorting;
                }
            }
        }
    }

    warnings.into_iter().collect()
}

/// Reachability closure over the repository's "references" relation.
fn transitive_references(repository: &dyn Repository, id: &str) -> HashSet<String> {
    if repository.node(id).is_none() {
        warn!(node = id, "could not resolve node while ordering, skipping its references");
        return HashSet::new();
    }
    let mut seen = HashSet::new();
    let mut stack = vec![id.to_string()];
    while let Some(current) = stack.pop() {
        for reference in repository.references(&current) {
            if seen.insert(reference.clone()) {
                stack.push(reference);
            }
        }
    }
    // a self-reference is not a dependency on oneself
    seen.remove(id);
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{Artifact, Capabilities, MemoryRepository};
    use crate::lifecycle::LifecycleKind;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Plain {
        id: &'static str,
        phase: StartPhase,
    }

    #[async_trait]
    impl Artifact for Plain {
        fn id(&self) -> &str {
            self.id
        }
        fn phase(&self) -> StartPhase {
            self.phase
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::service()
        }
    }

    fn artifact(id: &'static str) -> Arc<Plain> {
        Arc::new(Plain {
            id,
            phase: StartPhase::Normal,
        })
    }

    fn event(id: &str) -> LifecycleEvent {
        LifecycleEvent::new(id, LifecycleKind::Load, true)
    }

    fn ids(events: &[LifecycleEvent]) -> Vec<&str> {
        events.iter().map(|e| e.node_id.as_str()).collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let repo = MemoryRepository::new();
        repo.insert(artifact("x"), vec![]);
        repo.insert(artifact("y"), vec!["x".into()]);
        repo.insert(artifact("z"), vec!["y".into()]);

        // arbitrary arrival order
        let mut batch = vec![event("z"), event("x"), event("y")];
        let warnings = order_batch(&repo, &mut batch, None);

        assert_eq!(ids(&batch), vec!["x", "y", "z"]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_transitive_dependency_respected() {
        let repo = MemoryRepository::new();
        repo.insert(artifact("a"), vec![]);
        repo.insert(artifact("b"), vec!["a".into()]);
        repo.insert(artifact("c"), vec!["b".into()]);

        // c depends on a only transitively; only a and c are in the batch
        let mut batch = vec![event("c"), event("a")];
        order_batch(&repo, &mut batch, None);
        assert_eq!(ids(&batch), vec!["a", "c"]);
    }

    #[test]
    fn test_phase_breaks_ties_without_dependencies() {
        let repo = MemoryRepository::new();
        repo.insert(
            Arc::new(Plain {
                id: "late",
                phase: StartPhase::Late,
            }),
            vec![],
        );
        repo.insert(
            Arc::new(Plain {
                id: "early",
                phase: StartPhase::Early,
            }),
            vec![],
        );
        repo.insert(artifact("normal"), vec![]);

        let mut batch = vec![event("late"), event("normal"), event("early")];
        order_batch(&repo, &mut batch, None);
        assert_eq!(ids(&batch), vec!["early", "normal", "late"]);
    }

    #[test]
    fn test_dependency_outranks_phase() {
        let repo = MemoryRepository::new();
        // "late" has the later phase but "early" depends on it
        repo.insert(
            Arc::new(Plain {
                id: "late",
                phase: StartPhase::Late,
            }),
            vec![],
        );
        repo.insert(
            Arc::new(Plain {
                id: "early",
                phase: StartPhase::Early,
            }),
            vec!["late".into()],
        );

        let mut batch = vec![event("early"), event("late")];
        order_batch(&repo, &mut batch, None);
        assert_eq!(ids(&batch), vec!["late", "early"]);
    }

    #[test]
    fn test_cycle_terminates_with_single_warning() {
        let repo = MemoryRepository::new();
        repo.insert(artifact("a"), vec!["b".into()]);
        repo.insert(artifact("b"), vec!["a".into()]);

        let mut batch = vec![event("a"), event("b")];
        let warnings = order_batch(&repo, &mut batch, None);

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0], "Found circular reference between: a and b");
        // order untouched for the cyclic pair
        assert_eq!(ids(&batch), vec!["a", "b"]);
    }

    #[test]
    fn test_missing_node_is_skipped() {
        let repo = MemoryRepository::new();
        repo.insert(artifact("known"), vec!["ghost".into()]);

        let mut batch = vec![event("ghost"), event("known")];
        let warnings = order_batch(&repo, &mut batch, None);
        assert!(warnings.is_empty());
        // known depends on ghost, so ghost stays first
        assert_eq!(ids(&batch), vec!["ghost", "known"]);
    }

    #[test]
    fn test_pass_ceiling_still_terminates() {
        let repo = MemoryRepository::new();
        repo.insert(artifact("x"), vec![]);
        repo.insert(artifact("y"), vec!["x".into()]);
        repo.insert(artifact("z"), vec!["y".into()]);

        let mut batch = vec![event("z"), event("y"), event("x")];
        // a cap of one pass is not enough to fully sort, but must not loop
        order_batch(&repo, &mut batch, Some(1));
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn test_self_reference_is_not_a_cycle() {
        let repo = MemoryRepository::new();
        repo.insert(artifact("a"), vec!["a".into()]);
        repo.insert(artifact("b"), vec!["a".into()]);

        let mut batch = vec![event("b"), event("a")];
        let warnings = order_batch(&repo, &mut batch, None);
        assert!(warnings.is_empty());
        assert_eq!(ids(&batch), vec!["a", "b"]);
    }
}
