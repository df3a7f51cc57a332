// Execution Plan
// Batched topological ordering via Kahn's algorithm with level batching

use crate::graph::{GraphError, PipelineGraph};

/// The batched execution order for one run.
///
/// Each batch holds node ids whose predecessors all sit in earlier
/// batches; nodes within a batch carry no dependency relation to each
/// other and may run concurrently. Batches themselves are strictly
/// sequential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    batches: Vec<Vec<String>>,
}

impl ExecutionPlan {
    /// Compute the plan for a graph.
    ///
    /// Repeatedly collects all zero-in-degree nodes into the next
    /// batch, then decrements their successors. Within a batch nodes
    /// are ordered by node insertion order. On an already-validated
    /// graph this cannot fail; a cyclic graph is reported as a cycle
    /// error instead of looping.
    pub fn build(graph: &PipelineGraph) -> Result<Self, GraphError> {
        let n = graph.len();
        let mut in_degree: Vec<usize> = (0..n).map(|i| graph.incoming_count(i)).collect();

        let mut ready: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut batches = Vec::new();
        let mut placed = 0;

        while !ready.is_empty() {
            // Insertion-order tie-break within the batch
            ready.sort_unstable();

            let mut next_ready = Vec::new();
            for &idx in &ready {
                for succ in graph.successor_indices(idx) {
                    in_degree[succ] -= 1;
                    if in_degree[succ] == 0 {
                        next_ready.push(succ);
                    }
                }
            }

            placed += ready.len();
            batches.push(
                ready
                    .iter()
                    .map(|&i| graph.nodes()[i].id.clone())
                    .collect(),
            );
            ready = next_ready;
        }

        if placed != n {
            // Nodes left over means a dependency cycle. Let the
            // validator produce the canonical cycle path.
            graph.validate()?;
            let remaining = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| graph.nodes()[i].id.clone())
                .collect();
            return Err(GraphError::Cycle(remaining));
        }

        Ok(Self { batches })
    }

    pub fn batches(&self) -> &[Vec<String>] {
        &self.batches
    }

    /// Number of batches
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Total number of nodes across all batches
    pub fn node_count(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[String]> {
        self.batches.iter().map(Vec::as_slice)
    }
}
