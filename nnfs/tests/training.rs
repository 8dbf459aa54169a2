//! End-to-end training scenarios.

use ndarray::prelude::*;

use nnfs::callback::{CsvLogger, Summary};
use nnfs::layers::{Activation, Dense, Regularization, Relu, Sigmoid};
use nnfs::loss::{BinaryCrossEntropy, CceSoftmax};
use nnfs::optimizers::{Adagrad, Adam, RmsProp, Sgd};
use nnfs::*;

/// Three well separated clusters of six points each, labeled 0, 1, 2.
fn clusters() -> (Matrix, Targets) {
    let centers = [(0.0, 3.0), (3.0, 0.0), (-3.0, -3.0)];
    let offsets = [(0.0, 0.0), (0.4, 0.1), (-0.3, 0.2), (0.1, -0.4), (-0.2, -0.2), (0.3, 0.3)];
    let mut x = Matrix::zeros((18, 2));
    let mut labels = Array1::zeros(18);
    for (c, &(cx, cy)) in centers.iter().enumerate() {
        for (k, &(dx, dy)) in offsets.iter().enumerate() {
            let i = c * offsets.len() + k;
            x[[i, 0]] = cx + dx;
            x[[i, 1]] = cy + dy;
            labels[i] = c;
        }
    }
    (x, Targets::Classes(labels))
}

fn classifier(optimizer: impl Optimizer + 'static) -> NeuralNetwork {
    NeuralNetwork::builder()
        .layer(Dense::seeded(2, 16, 11))
        .relu()
        .layer(Dense::seeded(16, 3, 12))
        .build(CceSoftmax, optimizer)
        .unwrap()
}

/// Records every epoch it sees and asks to stop after `limit` of them.
struct StopAfter {
    limit: usize,
    seen: Vec<usize>,
}

impl Callback for StopAfter {
    fn on_epoch_end(&mut self, epoch: usize, summary: &Summary) -> Result<bool> {
        assert!(summary.get("loss").is_some());
        self.seen.push(epoch);
        Ok(self.seen.len() < self.limit)
    }
}

#[test]
fn scenario_shapes() {
    let x = Array2::from_shape_fn((4, 3), |(i, j)| (i as f64 - 1.5) * 0.5 + j as f64 * 0.1);
    let t = Targets::from(array![[1.0, 0.0], [0.0, 1.0], [1.0, 0.0], [0.0, 1.0]]);

    let mut dense1 = Dense::seeded(3, 5, 1);
    let mut relu = Activation::new(Relu);
    let mut dense2 = Dense::seeded(5, 2, 2);

    let h1 = dense1.forward(x.view()).unwrap();
    assert_eq!(h1.dim(), (4, 5));
    let h2 = relu.forward(h1.view()).unwrap();
    assert_eq!(h2.dim(), (4, 5));
    let out = dense2.forward(h2.view()).unwrap();
    assert_eq!(out.dim(), (4, 2));

    let loss = CceSoftmax.forward(out.view(), &t).unwrap();
    assert_eq!(loss.per_sample.len(), 4);
    assert!(loss.mean.is_finite() && loss.mean > 0.0);

    let d_out = CceSoftmax.backward(out.view(), &t).unwrap();
    assert_eq!(d_out.dim(), (4, 2));
    let d_h2 = dense2.backward(d_out.view()).unwrap();
    let d_h1 = relu.backward(d_h2.view()).unwrap();
    let dx = dense1.backward(d_h1.view()).unwrap();
    assert_eq!(dx.dim(), (4, 3));
    assert_eq!(dense1.weight_gradient().unwrap().dim(), (3, 5));
    assert_eq!(dense2.bias_gradient().unwrap().len(), 2);
}

#[test]
fn logistic_regression_loss_never_increases() {
    let mut net = NeuralNetwork::builder()
        .layer(Dense::seeded(2, 1, 5))
        .layer(Activation::new(Sigmoid))
        .build(BinaryCrossEntropy, Sgd::new(0.5).unwrap())
        .unwrap();
    let x = array![[1.0, 0.0], [0.0, 1.0]];
    let t = Targets::from(array![1, 0]);

    let history = net.fit(x.view(), &t, &FitConfig::new(50, 2), &mut []).unwrap();
    let losses = history.losses();
    assert_eq!(losses.len(), 50);
    for pair in losses.windows(2) {
        assert!(pair[1] <= pair[0], "loss went up: {pair:?}");
    }
    assert!(losses[49] < losses[0]);

    let accuracy = net.evaluate(x.view(), &t, &[Metric::BinaryAccuracy]).unwrap();
    assert_eq!(accuracy.get("binary_accuracy"), Some(1.0));
}

#[test]
fn learns_to_classify_clusters() {
    let (x, t) = clusters();
    let mut net = classifier(Adam::new(0.02).unwrap());
    let config = FitConfig::new(150, 6)
        .shuffle(Shuffle::Seeded(3))
        .metric(Metric::Accuracy);
    let history = net.fit(x.view(), &t, &config, &mut []).unwrap();

    let first = &history.epochs[0];
    let last = history.last().unwrap();
    assert!(last.loss() < first.loss());
    assert!(last.get("accuracy").unwrap() >= 0.9);

    let summary = net.evaluate(x.view(), &t, &[Metric::Accuracy]).unwrap();
    assert!(summary.get("accuracy").unwrap() >= 0.9);
    assert_eq!(net.epochs_trained(), 150);
    assert_eq!(net.steps(), 450);
}

#[test]
fn every_optimizer_makes_progress() {
    let (x, t) = clusters();
    let optimizers: Vec<Box<dyn Fn() -> NeuralNetwork>> = vec![
        Box::new(|| classifier(Sgd::new(0.05).unwrap())),
        Box::new(|| classifier(Sgd::new(0.02).unwrap().with_momentum(0.9).unwrap())),
        Box::new(|| classifier(Sgd::new(0.1).unwrap().with_decay(0.01).unwrap())),
        Box::new(|| classifier(Adagrad::new(0.05).unwrap())),
        Box::new(|| classifier(RmsProp::new(0.01).unwrap())),
        Box::new(|| classifier(Adam::new(0.01).unwrap())),
    ];
    for make in optimizers {
        let mut net = make();
        let before = net.evaluate(x.view(), &t, &[]).unwrap().loss();
        net.fit(x.view(), &t, &FitConfig::new(30, 18), &mut []).unwrap();
        let after = net.evaluate(x.view(), &t, &[]).unwrap().loss();
        assert!(after < before, "{:?}: loss {before} -> {after}", net.optimizer());
    }
}

#[test]
fn predict_has_no_side_effects() {
    let (x, t) = clusters();
    let mut net = classifier(Sgd::new(0.1).unwrap());
    let a = net.predict(x.view()).unwrap();
    let b = net.predict(x.view()).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.dim(), (18, 3));
    assert_eq!(net.steps(), 0);

    net.fit(x.view(), &t, &FitConfig::new(1, 18), &mut []).unwrap();
    let c = net.predict(x.view()).unwrap();
    assert_ne!(a, c);
    assert_eq!(c, net.predict(x.view()).unwrap());
}

#[test]
fn callbacks_can_stop_training() {
    let (x, t) = clusters();
    let mut net = classifier(Sgd::new(0.1).unwrap());
    let mut stopper = StopAfter { limit: 3, seen: vec![] };
    let mut watcher = StopAfter { limit: usize::MAX, seen: vec![] };

    let history = net
        .fit(x.view(), &t, &FitConfig::new(10, 4), &mut [&mut stopper, &mut watcher])
        .unwrap();
    assert!(history.stopped_early);
    assert_eq!(history.epochs.len(), 3);
    assert_eq!(stopper.seen, [0, 1, 2]);
    // Every callback hears about the last epoch, even after one asked to stop.
    assert_eq!(watcher.seen, [0, 1, 2]);
    assert_eq!(net.epochs_trained(), 3);
    assert_eq!(net.steps(), 3 * 5);
}

#[test]
fn seeded_shuffle_is_reproducible() {
    let (x, t) = clusters();
    let train = |shuffle: Shuffle| {
        let mut net = classifier(Sgd::new(0.05).unwrap());
        let config = FitConfig::new(5, 4).shuffle(shuffle);
        let history = net.fit(x.view(), &t, &config, &mut []).unwrap();
        (history.losses(), net.predict(x.view()).unwrap())
    };

    let (losses_a, out_a) = train(Shuffle::Seeded(9));
    let (losses_b, out_b) = train(Shuffle::Seeded(9));
    assert_eq!(losses_a, losses_b);
    assert_eq!(out_a, out_b);

    let (_, out_c) = train(Shuffle::Seeded(10));
    assert_ne!(out_a, out_c);
    let (_, out_fixed) = train(Shuffle::None);
    assert_eq!(out_fixed, train(Shuffle::None).1);
}

#[test]
fn regularization_is_reported_separately() {
    let (x, t) = clusters();
    let mut net = NeuralNetwork::builder()
        .layer(Dense::seeded(2, 8, 1).with_regularization(Regularization {
            l2_weights: 5e-4,
            l2_bias: 5e-4,
            ..Regularization::default()
        }))
        .relu()
        .layer(Dense::seeded(8, 3, 2))
        .build(CceSoftmax, Adam::new(0.01).unwrap())
        .unwrap();
    let history = net.fit(x.view(), &t, &FitConfig::new(2, 9), &mut []).unwrap();
    for summary in &history.epochs {
        let penalty = summary.get("regularization_loss").unwrap();
        assert!(penalty > 0.0);
        assert!(summary.loss() > 0.0);
    }
    assert_eq!(
        net.evaluate(x.view(), &t, &[]).unwrap().get("regularization_loss"),
        net.regularization_loss()
    );
}

#[test]
fn csv_logger_records_each_epoch() {
    let (x, t) = clusters();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("training.csv");
    let mut logger = CsvLogger::new(&path, false).unwrap();
    let mut net = classifier(Adam::default());
    let config = FitConfig::new(4, 6).metric(Metric::Accuracy);
    net.fit(x.view(), &t, &config, &mut [&mut logger]).unwrap();

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(headers, ["epoch", "accuracy", "loss"]);
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 4);
    for (epoch, row) in rows.iter().enumerate() {
        assert_eq!(row[0].parse::<usize>().unwrap(), epoch);
        let loss: f64 = row[2].parse().unwrap();
        assert!(loss.is_finite() && loss > 0.0);
    }

    assert!(CsvLogger::new(&path, false).is_err());
}

/// Keeps every summary it is handed.
#[derive(Default)]
struct Recorder(Vec<Summary>);

impl Callback for Recorder {
    fn on_epoch_end(&mut self, _epoch: usize, summary: &Summary) -> Result<bool> {
        self.0.push(summary.clone());
        Ok(true)
    }
}

#[test]
fn validation_scores_reach_callbacks() {
    let (x, t) = clusters();
    let held_out = x.select(Axis(0), &[0, 7, 14]);
    let held_out_targets = Targets::from(array![0, 1, 2]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("validated.csv");
    let mut logger = CsvLogger::new(&path, false).unwrap();
    let mut recorder = Recorder::default();
    let mut net = classifier(Adam::new(0.02).unwrap());
    let config = FitConfig::new(3, 6)
        .metric(Metric::Accuracy)
        .validation(held_out.clone(), held_out_targets.clone());
    let history = net
        .fit(x.view(), &t, &config, &mut [&mut logger, &mut recorder])
        .unwrap();

    assert_eq!(recorder.0, history.epochs);
    for summary in &recorder.0 {
        assert!(summary.get("val_loss").unwrap() > 0.0);
        assert!((0.0..=1.0).contains(&summary.get("val_accuracy").unwrap()));
    }
    let last = history.last().unwrap();
    let scored = net.evaluate(held_out.view(), &held_out_targets, &[Metric::Accuracy]).unwrap();
    assert_eq!(last.get("val_loss"), Some(scored.loss()));
    assert_eq!(last.get("val_accuracy"), scored.get("accuracy"));

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(headers, ["epoch", "accuracy", "loss", "val_accuracy", "val_loss"]);
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert!(row[4].parse::<f64>().unwrap() > 0.0);
    }
}

#[test]
fn validation_does_not_change_training() {
    let (x, t) = clusters();
    let mut plain = classifier(Adam::new(0.02).unwrap());
    let mut validated = classifier(Adam::new(0.02).unwrap());
    let config = FitConfig::new(4, 5).shuffle(Shuffle::Seeded(1));

    let a = plain.fit(x.view(), &t, &config, &mut []).unwrap();
    let b = validated
        .fit(x.view(), &t, &config.clone().validation(x.clone(), t.clone()), &mut [])
        .unwrap();

    assert_eq!(a.losses(), b.losses());
    assert_eq!(plain.steps(), validated.steps());
    assert_eq!(plain.optimizer().iterations(), validated.optimizer().iterations());
    assert_eq!(plain.predict(x.view()).unwrap(), validated.predict(x.view()).unwrap());
    assert!(a.last().unwrap().get("val_loss").is_none());
}

#[test]
fn bad_label_anywhere_stops_fit_before_training() {
    let (x, _) = clusters();
    let mut labels = Array1::<usize>::zeros(18);
    labels[17] = 3;
    let mut net = classifier(Sgd::new(0.5).unwrap());
    let before = net.predict(x.view()).unwrap();
    assert!(matches!(
        net.fit(x.view(), &Targets::from(labels), &FitConfig::new(2, 4), &mut []),
        Err(NnfsError::InvalidConfiguration(_))
    ));
    assert_eq!(net.steps(), 0);
    assert_eq!(net.epochs_trained(), 0);
    assert_eq!(net.predict(x.view()).unwrap(), before);
}

#[test]
fn configuration_errors_surface_before_training() {
    let (x, t) = clusters();
    let mut net = classifier(Sgd::new(0.1).unwrap());
    assert!(matches!(
        net.fit(x.view(), &t, &FitConfig::new(1, 0), &mut []),
        Err(NnfsError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        net.fit(x.view(), &Targets::from(Array1::<usize>::zeros(3)), &FitConfig::new(1, 1), &mut []),
        Err(NnfsError::ShapeMismatch { .. })
    ));
    let wrong_width = Targets::from(Matrix::zeros((18, 2)));
    assert!(matches!(
        net.fit(x.view(), &wrong_width, &FitConfig::new(1, 18), &mut []),
        Err(NnfsError::ShapeMismatch { .. })
    ));
    assert!(matches!(
        NeuralNetwork::new(vec![], CceSoftmax, Sgd::new(0.1).unwrap()),
        Err(NnfsError::InvalidConfiguration(_))
    ));
    assert_eq!(net.epochs_trained(), 0);
}
