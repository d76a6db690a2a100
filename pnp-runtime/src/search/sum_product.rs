//! Exhaustive exploration of the choice graph.
//!
//! Every reachable state becomes a vertex. States produced by the same
//! alternative of the same choice, resuming the same continuation under the
//! same variables, share one vertex, so a program that can reach one of its
//! own unfinished states is rejected as cyclic. Path mass is then pushed
//! from the root to the terminal vertices in topological order.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, info};

use pnp_core::{
    ComputationGraph, Env, ExecutionScore, PnpError, Result, SearchConfig, SearchLogger,
};

use crate::program::Program;
use crate::queue::{ChoiceSite, EnumerateQueue, SearchQueue, SearchState};
use crate::step::{search_step, StepContext};

const SUM_PRODUCT_TIMER: &str = "pnp_sum_product";

type VertexKey = ((usize, usize, usize), usize);

/// A finished value and the total probability of the paths reaching it.
#[derive(Debug, Clone)]
pub struct Terminal<A> {
    pub value: A,
    pub env: Env,
    pub prob: f64,
}

/// Report of an exhaustive exploration.
#[derive(Debug, Clone)]
pub struct SumProduct<A> {
    terminals: Vec<Terminal<A>>,
    vertices: usize,
    edges: usize,
    truncated: bool,
}

impl<A> SumProduct<A> {
    /// Terminal vertices in discovery order.
    pub fn terminals(&self) -> &[Terminal<A>] {
        &self.terminals
    }

    pub fn vertices(&self) -> usize {
        self.vertices
    }

    pub fn edges(&self) -> usize {
        self.edges
    }

    /// Whether the expansion cap stopped the exploration early.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn partition_function(&self) -> f64 {
        self.terminals.iter().map(|t| t.prob).sum()
    }
}

impl<A: PartialEq> SumProduct<A> {
    /// Summed probability of every terminal holding `value`.
    pub fn prob(&self, value: &A) -> f64 {
        self.terminals
            .iter()
            .filter(|t| t.value == *value)
            .map(|t| t.prob)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    /// Discovered, waiting on the stack.
    Pending,
    /// On the current depth-first path.
    Active,
    Done,
}

struct Vertex {
    state: Option<SearchState>,
    /// The site and environment behind the vertex key, kept alive so no
    /// later state can reuse those addresses.
    _anchor: Option<(ChoiceSite, Env)>,
    status: Status,
    /// Outgoing `(vertex, log-weight)` edges.
    edges: Vec<(usize, f64)>,
    terminal: bool,
}

enum Visit {
    Enter(usize),
    Exit(usize),
}

struct Explorer<'a> {
    vertices: Vec<Vertex>,
    index: HashMap<VertexKey, usize>,
    stack: Vec<Visit>,
    ctx: StepContext<'a>,
}

impl Explorer<'_> {
    fn add_vertex(&mut self, mut state: SearchState, terminal: bool) -> usize {
        let id = self.vertices.len();
        let anchor = state.site.take().map(|site| (site, state.env.clone()));
        if let Some((site, env)) = &anchor {
            self.index.insert((site.key(), env.vars_id()), id);
        }
        self.vertices.push(Vertex {
            state: Some(state),
            _anchor: anchor,
            status: if terminal { Status::Done } else { Status::Pending },
            edges: Vec::new(),
            terminal,
        });
        if !terminal {
            self.stack.push(Visit::Enter(id));
        }
        id
    }

    /// The vertex for `state`, reusing an explored one when the keys match.
    fn successor(&mut self, state: SearchState) -> Result<usize> {
        let key = state
            .site
            .as_ref()
            .map(|site| (site.key(), state.env.vars_id()));
        if let Some(&id) = key.as_ref().and_then(|k| self.index.get(k)) {
            if self.vertices[id].status == Status::Active {
                return Err(PnpError::CyclicProgram { vertex: id });
            }
            return Ok(id);
        }
        Ok(self.add_vertex(state, false))
    }

    fn expand(&mut self, id: usize) -> Result<()> {
        let Some(mut state) = self.vertices[id].state.take() else {
            return Ok(());
        };
        // Offers then carry the weight of a single edge.
        state.log_prob = 0.0;
        let mut children = EnumerateQueue::new(self.ctx.score);
        let mut finished = EnumerateQueue::new(self.ctx.score);
        search_step(state, &self.ctx, &mut children, &mut finished)?;

        let mut edges = Vec::new();
        for state in finished.drain() {
            let weight = state.log_prob;
            edges.push((self.add_vertex(state, true), weight));
        }
        // Reverse so the first alternative is explored first.
        let mut successors = children.drain();
        successors.reverse();
        for state in successors {
            let weight = state.log_prob;
            edges.push((self.successor(state)?, weight));
        }
        self.vertices[id].edges = edges;
        Ok(())
    }
}

pub(crate) fn run<A: Clone + 'static>(
    program: &Program<A>,
    config: &SearchConfig,
    env: Env,
    score: &ExecutionScore,
    graph: &dyn ComputationGraph,
    logger: &mut dyn SearchLogger,
) -> Result<SumProduct<A>> {
    logger.start_timer(SUM_PRODUCT_TIMER);
    let result = explore(program, config, env, score, graph, logger);
    logger.stop_timer(SUM_PRODUCT_TIMER);
    result
}

fn explore<A: Clone + 'static>(
    program: &Program<A>,
    config: &SearchConfig,
    env: Env,
    score: &ExecutionScore,
    graph: &dyn ComputationGraph,
    logger: &mut dyn SearchLogger,
) -> Result<SumProduct<A>> {
    let mut roots = EnumerateQueue::new(score);
    roots.offer(SearchState::root(program.node().clone(), env.clone(), 0.0), &env);
    let Some(root) = roots.drain().pop() else {
        return Ok(SumProduct {
            terminals: Vec::new(),
            vertices: 0,
            edges: 0,
            truncated: false,
        });
    };
    let root_weight = root.log_prob;

    let mut explorer = Explorer {
        vertices: Vec::new(),
        index: HashMap::new(),
        stack: Vec::new(),
        ctx: StepContext { graph, score },
    };
    explorer.add_vertex(root, false);

    let mut expansions = 0;
    let mut truncated = false;
    while let Some(visit) = explorer.stack.pop() {
        match visit {
            Visit::Enter(id) => {
                if explorer.vertices[id].status != Status::Pending {
                    continue;
                }
                if config.max_iterations != 0 && expansions >= config.max_iterations {
                    truncated = true;
                    break;
                }
                explorer.vertices[id].status = Status::Active;
                explorer.stack.push(Visit::Exit(id));
                logger.notify_iteration_start(expansions);
                explorer.expand(id)?;
                logger.notify_iteration_end(expansions);
                expansions += 1;
            }
            Visit::Exit(id) => explorer.vertices[id].status = Status::Done,
        }
    }

    let vertices = explorer.vertices;
    let mass = propagate(&vertices, root_weight.exp())?;
    let vertex_count = vertices.len();
    let edges: usize = vertices.iter().map(|v| v.edges.len()).sum();

    let mut terminals = Vec::new();
    for (id, vertex) in vertices.into_iter().enumerate() {
        let (true, Some(state)) = (vertex.terminal, vertex.state) else {
            continue;
        };
        info!(vertex = id, prob = mass[id], "sum-product terminal");
        let execution = state.into_execution::<A>()?;
        terminals.push(Terminal {
            value: execution.value,
            env: execution.env,
            prob: mass[id],
        });
    }

    logger.log_statistic(expansions, "vertices", vertex_count as f64);
    logger.log_statistic(expansions, "edges", edges as f64);
    debug!(
        vertices = vertex_count,
        edges,
        expansions,
        truncated,
        "sum-product exploration done"
    );

    Ok(SumProduct {
        terminals,
        vertices: vertex_count,
        edges,
        truncated,
    })
}

/// Push `root_mass` along every edge in topological order. A vertex left
/// unordered lies on a cycle.
fn propagate(vertices: &[Vertex], root_mass: f64) -> Result<Vec<f64>> {
    let mut indegree = vec![0usize; vertices.len()];
    for vertex in vertices {
        for &(to, _) in &vertex.edges {
            indegree[to] += 1;
        }
    }

    let mut mass = vec![0.0; vertices.len()];
    if vertices.is_empty() {
        return Ok(mass);
    }
    mass[0] = root_mass;

    let mut ready: VecDeque<usize> = (0..vertices.len()).filter(|&v| indegree[v] == 0).collect();
    let mut ordered = 0;
    while let Some(v) = ready.pop_front() {
        ordered += 1;
        for &(to, weight) in &vertices[v].edges {
            mass[to] += mass[v] * weight.exp();
            indegree[to] -= 1;
            if indegree[to] == 0 {
                ready.push_back(to);
            }
        }
    }

    if ordered < vertices.len() {
        let vertex = indegree.iter().position(|&d| d > 0).unwrap_or(0);
        return Err(PnpError::CyclicProgram { vertex });
    }
    Ok(mass)
}
