use pnp_backend_cpu::{CpuGraph, SgdOptimizer};
use pnp_runtime::{
    ComputationGraph, Env, Example, ExecutionScore, Expr, NullLogger, Objective, PnpError,
    Program, SearchLogger, Trainer, TrainingConfig, TracingLogger,
};

fn letters() -> Program<char> {
    Program::choose_param_tagged(vec!['a', 'b', 'c'], "w", ())
}

fn gold(label: char) -> ExecutionScore {
    ExecutionScore::tagged(move |_: &(), c: &char, _| {
        if *c == label {
            0.0
        } else {
            f64::NEG_INFINITY
        }
    })
}

fn example(label: char) -> Example<char> {
    Example::new(letters(), letters(), Env::init(), gold(label))
}

fn config(epochs: usize, objective: Objective) -> TrainingConfig {
    TrainingConfig {
        epochs,
        objective,
        ..Default::default()
    }
}

fn probs(graph: &CpuGraph) -> Vec<f64> {
    graph
        .forward(&Expr::parameter("w").log_softmax())
        .unwrap()
        .into_iter()
        .map(f64::exp)
        .collect()
}

#[test]
fn test_training_moves_mass_to_label() {
    let mut graph = CpuGraph::new().with_parameter("w", vec![0.0; 3]);
    let mut sgd = SgdOptimizer::new(1.0);
    let trainer = Trainer::new(config(20, Objective::Loglikelihood));
    let mut logger = TracingLogger::new();
    let stats = trainer
        .train(&mut graph, &mut sgd, &[example('b')], &mut logger)
        .unwrap();

    assert_eq!(stats.epochs, 20);
    assert_eq!(stats.examples, 20);
    assert_eq!(stats.search_errors, 0);
    assert!((stats.losses[0] - 3f64.ln()).abs() < 1e-9);
    assert!(stats.losses[19] < stats.losses[0]);
    assert!(probs(&graph)[1] > 0.9);
    assert_eq!(logger.statistic("loss").len(), 20);
    assert_eq!(sgd.epoch(), 20);
}

#[test]
fn test_search_error_is_counted() {
    let mut graph = CpuGraph::new().with_parameter("w", vec![0.0; 3]);
    let mut sgd = SgdOptimizer::new(1.0);
    let trainer = Trainer::new(config(3, Objective::Loglikelihood));
    let stats = trainer
        .train(&mut graph, &mut sgd, &[example('z'), example('a')], &mut NullLogger)
        .unwrap();
    assert_eq!(stats.search_errors, 3);
    assert_eq!(stats.examples, 3);
    assert_eq!(stats.losses.len(), 3);
}

#[test]
fn test_multiple_labels_rejected_unless_allowed() {
    let ambiguous = Example::new(
        letters(),
        letters(),
        Env::init(),
        ExecutionScore::tagged(|_: &(), c: &char, _| {
            if *c == 'c' {
                f64::NEG_INFINITY
            } else {
                0.0
            }
        }),
    );
    let mut graph = CpuGraph::new().with_parameter("w", vec![0.0; 3]);
    let mut sgd = SgdOptimizer::new(0.1);

    let strict = Trainer::new(config(1, Objective::Loglikelihood));
    let result = strict.train(
        &mut graph,
        &mut sgd,
        std::slice::from_ref(&ambiguous),
        &mut NullLogger,
    );
    assert!(matches!(
        result,
        Err(PnpError::MultipleLabels {
            example: 0,
            count: 2
        })
    ));

    let mut relaxed_config = config(1, Objective::Loglikelihood);
    relaxed_config.allow_multiple_labels = true;
    let stats = Trainer::new(relaxed_config)
        .train(
            &mut graph,
            &mut sgd,
            std::slice::from_ref(&ambiguous),
            &mut NullLogger,
        )
        .unwrap();
    // -log(1/3 + 1/3)
    assert!((stats.losses[0] + (2.0f64 / 3.0).ln()).abs() < 1e-9);
}

/// Tracks which timers are currently running.
#[derive(Default)]
struct OpenTimers {
    running: Vec<String>,
    started: usize,
}

impl SearchLogger for OpenTimers {
    fn start_timer(&mut self, name: &str) {
        self.running.push(name.to_string());
        self.started += 1;
    }
    fn stop_timer(&mut self, name: &str) {
        self.running.retain(|n| n != name);
    }
    fn log_statistic(&mut self, _iteration: usize, _name: &str, _value: f64) {}
    fn notify_iteration_start(&mut self, _iteration: usize) {}
    fn notify_iteration_end(&mut self, _iteration: usize) {}
}

#[test]
fn test_failed_training_stops_its_timer() {
    let ambiguous = Example::new(letters(), letters(), Env::init(), ExecutionScore::zero());
    let mut graph = CpuGraph::new().with_parameter("w", vec![0.0; 3]);
    let mut sgd = SgdOptimizer::new(0.1);
    let mut logger = OpenTimers::default();

    let result = Trainer::new(config(2, Objective::Loglikelihood)).train(
        &mut graph,
        &mut sgd,
        std::slice::from_ref(&ambiguous),
        &mut logger,
    );
    assert!(matches!(result, Err(PnpError::MultipleLabels { .. })));
    assert!(logger.started >= 2);
    assert!(logger.running.is_empty(), "left running: {:?}", logger.running);
}

#[test]
fn test_global_objective_matches_local_when_normalized() {
    let mut graph = CpuGraph::new().with_parameter("w", vec![0.0; 3]);
    let mut sgd = SgdOptimizer::new(0.5);
    let trainer = Trainer::new(config(1, Objective::GlobalLoglikelihood));
    let stats = trainer
        .train(&mut graph, &mut sgd, &[example('c')], &mut NullLogger)
        .unwrap();
    assert!((stats.losses[0] - 3f64.ln()).abs() < 1e-9);
    assert!(probs(&graph)[2] > 1.0 / 3.0);
}

#[test]
fn test_global_objective_trains_unnormalized_graph() {
    let mut graph = CpuGraph::new()
        .with_locally_normalized(false)
        .with_parameter("w", vec![0.0; 3]);
    let mut sgd = SgdOptimizer::new(0.5);
    let trainer = Trainer::new(config(10, Objective::GlobalLoglikelihood));
    let stats = trainer
        .train(&mut graph, &mut sgd, &[example('a')], &mut NullLogger)
        .unwrap();
    assert!(stats.losses[9] < stats.losses[0]);
    let w = graph.parameter_value("w").unwrap();
    assert!(w[0] > w[1] && w[0] > w[2]);
}
