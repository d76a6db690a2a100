use std::cell::OnceCell;
use std::rc::Rc;

use pnp_backend_cpu::CpuGraph;
use pnp_runtime::{
    Env, ExecutionScore, NullLogger, PnpError, Program, SearchConfig, SumProduct, TracingLogger,
};

fn explore<A: Clone + 'static>(program: &Program<A>) -> pnp_runtime::Result<SumProduct<A>> {
    program.sum_product(
        &SearchConfig::default(),
        Env::init(),
        &ExecutionScore::zero(),
        &CpuGraph::new(),
        &mut NullLogger,
    )
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_terminal_probabilities() {
    let program = Program::choose_map(vec![(1, 0.25), (2, 0.75)])
        .flat_map(|a| Program::choose_map(vec![(a, 0.5), (a * 10, 0.5)]));
    let report = explore(&program).unwrap();
    assert_eq!(report.terminals().len(), 4);
    assert!(close(report.partition_function(), 1.0));
    assert!(close(report.prob(&20), 0.375));
    assert!(close(report.prob(&1), 0.125));
    assert!(!report.is_truncated());
}

#[test]
fn test_shared_states_are_merged() {
    let coin = Program::choose_map(vec![('h', 0.5), ('t', 0.5)]);
    let program = Program::choose_map(vec![(0, 0.5), (1, 0.5)]).flat_map(move |_| coin.clone());
    let report = explore(&program).unwrap();
    // root, two first choices, two shared coin states, two terminals
    assert_eq!(report.vertices(), 7);
    assert_eq!(report.edges(), 8);
    assert_eq!(report.terminals().len(), 2);
    assert!(close(report.prob(&'h'), 0.5));
    assert!(close(report.prob(&'t'), 0.5));
}

#[test]
fn test_shared_tail_keeps_branch_variables_apart() {
    let tail = Program::choose_map(vec![(0u32, 0.5), (1u32, 0.5)])
        .flat_map(|bit| Program::<u32>::get_var("x").map(move |x| x * 10 + bit));
    let branches: Vec<(u32, f64)> = (0..30).map(|x| (x, 1.0 / 30.0)).collect();
    let program = Program::choose_map(branches).flat_map(move |x| {
        let tail = tail.clone();
        Program::set_var("x", x).flat_map(move |_| tail.clone())
    });

    let report = explore(&program).unwrap();
    // root, 30 branches, two coin states and two terminals per branch
    assert_eq!(report.vertices(), 151);
    assert_eq!(report.edges(), 150);
    assert_eq!(report.terminals().len(), 60);
    for terminal in report.terminals() {
        assert_eq!(terminal.env.get::<u32>("x").ok(), Some(&(terminal.value / 10)));
        assert!(close(terminal.prob, 1.0 / 60.0), "{} had {}", terminal.value, terminal.prob);
    }
    for x in 0..30u32 {
        assert!(close(report.prob(&(x * 10)), 1.0 / 60.0));
        assert!(close(report.prob(&(x * 10 + 1)), 1.0 / 60.0));
    }
    assert!(close(report.partition_function(), 1.0));
}

#[test]
fn test_cyclic_program_is_fatal() {
    let cell: Rc<OnceCell<Program<i32>>> = Rc::new(OnceCell::new());
    let handle = cell.clone();
    let program = Program::choose(vec![0, 1]).flat_map(move |_| match handle.get() {
        Some(program) => program.clone(),
        None => Program::fail(),
    });
    assert!(cell.set(program.clone()).is_ok());

    assert!(matches!(
        explore(&program),
        Err(PnpError::CyclicProgram { .. })
    ));
}

#[test]
fn test_fail_has_no_terminals() {
    let report = explore(&Program::<u8>::fail()).unwrap();
    assert!(report.terminals().is_empty());
    assert_eq!(report.partition_function(), 0.0);
    assert_eq!(report.vertices(), 1);
}

#[test]
fn test_score_rejection_prunes_terminals() {
    let program = Program::choose_map(vec![('a', 0.5), ('b', 0.5)]);
    let oracle = ExecutionScore::tagged(|_: &(), c: &char, _| {
        if *c == 'a' {
            0.0
        } else {
            f64::NEG_INFINITY
        }
    });
    let tagged = Program::choose_map_tagged(vec![('a', 0.5), ('b', 0.5)], ());
    let report = tagged
        .sum_product(
            &SearchConfig::default(),
            Env::init(),
            &oracle,
            &CpuGraph::new(),
            &mut NullLogger,
        )
        .unwrap();
    assert_eq!(report.terminals().len(), 1);
    assert!(close(report.prob(&'a'), 0.5));
    assert_eq!(explore(&program).unwrap().terminals().len(), 2);
}

#[test]
fn test_expansion_cap_truncates() {
    fn walk(n: u64) -> Program<u64> {
        Program::choose_map(vec![(n, 0.5), (n + 1, 0.5)]).flat_map(|n| walk(n + 1))
    }
    let config = SearchConfig {
        beam_size: 1,
        max_iterations: 20,
    };
    let mut logger = TracingLogger::new();
    let report = walk(0)
        .sum_product(
            &config,
            Env::init(),
            &ExecutionScore::zero(),
            &CpuGraph::new(),
            &mut logger,
        )
        .unwrap();
    assert!(report.is_truncated());
    assert!(report.terminals().is_empty());
    assert_eq!(logger.statistic("vertices").len(), 1);
}

#[test]
fn test_neural_terminals_use_graph_weights() {
    let graph = CpuGraph::new().with_parameter("w", vec![0.0, 3f64.ln()]);
    let report = Program::choose_param(vec!['x', 'y'], "w")
        .sum_product(
            &SearchConfig::default(),
            Env::init(),
            &ExecutionScore::zero(),
            &graph,
            &mut NullLogger,
        )
        .unwrap();
    assert!(close(report.prob(&'x'), 0.25));
    assert!(close(report.prob(&'y'), 0.75));
}
