use log::{debug, info, trace, warn};
use ndarray::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::callback::Summary;
use crate::error::{NnfsError, Result};
use crate::layers::{Activation, Dense, Linear, Relu, Sigmoid, Softmax, Tanh};
use crate::traits::{Callback, Layer, Loss, Model, Optimizer};
use crate::{Matrix, Metric, Targets};

/// `predict` splits bigger inputs into chunks of this many rows and runs them
/// in parallel.
const PREDICT_CHUNK_ROWS: usize = 256;

/// Order in which `fit` visits the training examples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Shuffle {
    /// Every epoch walks the examples in their given order.
    #[default]
    None,
    /// Each epoch uses a fresh permutation drawn from an RNG seeded once per
    /// `fit` call, so the same seed always trains the same way.
    Seeded(u64),
}

/// Held-out examples scored after every epoch. They are never trained on.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub x: Matrix,
    pub targets: Targets,
}

/// Settings for one call to `fit`.
#[derive(Debug, Clone, PartialEq)]
pub struct FitConfig {
    pub epochs: usize,
    /// Examples per batch. The last batch of an epoch may be smaller.
    pub batch_size: usize,
    pub shuffle: Shuffle,
    /// Extra values to record in each epoch's summary.
    pub metrics: Vec<Metric>,
    /// If present, each epoch's summary also gets the loss and metrics on
    /// this set, under names starting with `val_`.
    pub validation: Option<Validation>,
}

impl FitConfig {
    pub fn new(epochs: usize, batch_size: usize) -> Self {
        FitConfig {
            epochs,
            batch_size,
            shuffle: Shuffle::None,
            metrics: vec![],
            validation: None,
        }
    }

    pub fn shuffle(self, shuffle: Shuffle) -> Self {
        FitConfig { shuffle, ..self }
    }

    pub fn metric(mut self, metric: Metric) -> Self {
        if !self.metrics.contains(&metric) {
            self.metrics.push(metric);
        }
        self
    }

    pub fn validation(self, x: Matrix, targets: Targets) -> Self {
        FitConfig {
            validation: Some(Validation { x, targets }),
            ..self
        }
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(NnfsError::config("batch size must be at least 1"));
        }
        if let Some(validation) = &self.validation {
            if validation.x.nrows() == 0 {
                return Err(NnfsError::config("empty validation set"));
            }
        }
        Ok(())
    }
}

/// What happened during one call to `fit`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    /// Summary of each completed epoch, in order.
    pub epochs: Vec<Summary>,
    /// True if a callback ended training before the last epoch.
    pub stopped_early: bool,
}

impl History {
    pub fn losses(&self) -> Vec<f64> {
        self.epochs.iter().map(Summary::loss).collect()
    }

    pub fn last(&self) -> Option<&Summary> {
        self.epochs.last()
    }
}

/// A sequence of layers trained end to end against one loss function by one
/// optimizer.
#[derive(Debug)]
pub struct NeuralNetwork {
    layers: Vec<Box<dyn Layer>>,
    loss: Box<dyn Loss>,
    optimizer: Box<dyn Optimizer>,
    output_width: Option<usize>,
    epochs_trained: usize,
    steps: usize,
}

impl NeuralNetwork {
    /// Compose a network. Fails if there are no layers or if the width of
    /// some layer's output doesn't match what the next layer takes.
    pub fn new(
        layers: Vec<Box<dyn Layer>>,
        loss: impl Loss + 'static,
        optimizer: impl Optimizer + 'static,
    ) -> Result<Self> {
        if layers.is_empty() {
            return Err(NnfsError::config("a network needs at least one layer"));
        }
        let mut width = None;
        for layer in &layers {
            width = layer.output_width(width)?;
        }
        Ok(NeuralNetwork {
            layers,
            loss: Box::new(loss),
            optimizer: Box::new(optimizer),
            output_width: width,
            epochs_trained: 0,
            steps: 0,
        })
    }

    pub fn builder() -> NetworkBuilder {
        NetworkBuilder::default()
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn loss(&self) -> &dyn Loss {
        &*self.loss
    }

    pub fn optimizer(&self) -> &dyn Optimizer {
        &*self.optimizer
    }

    pub fn optimizer_mut(&mut self) -> &mut dyn Optimizer {
        &mut *self.optimizer
    }

    /// Number of features each example of the output has, if any layer fixes
    /// it.
    pub fn output_width(&self) -> Option<usize> {
        self.output_width
    }

    pub fn num_params(&self) -> usize {
        self.layers.iter().map(|layer| layer.num_params()).sum()
    }

    /// Number of epochs completed across all calls to `fit`.
    pub fn epochs_trained(&self) -> usize {
        self.epochs_trained
    }

    /// Number of batches trained on across all calls to `fit`.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Sum of every layer's regularization penalty, or `None` if no layer is
    /// regularized.
    pub fn regularization_loss(&self) -> Option<f64> {
        self.layers
            .iter()
            .filter_map(|layer| layer.regularization_loss())
            .reduce(|a, b| a + b)
    }

    /// Check that `x` fits the first layer and that `targets` has one entry
    /// per example, each comparable with the last layer's output.
    fn check_data(&self, x: ArrayView2<'_, f64>, targets: &Targets, operation: &'static str) -> Result<()> {
        if targets.len() != x.nrows() {
            return Err(NnfsError::shape(operation, &[x.nrows()], &[targets.len()]));
        }
        let mut width = Some(x.ncols());
        for layer in &self.layers {
            width = layer.output_width(width)?;
        }
        if let Some(width) = width {
            targets.check_width(width, operation)?;
        }
        Ok(())
    }

    /// One forward pass, one backward pass, and one optimizer step. Returns
    /// the mean loss of the batch and the network's output for it.
    fn train_batch(&mut self, x: ArrayView2<'_, f64>, targets: &Targets) -> Result<(f64, Matrix)> {
        let mut y = x.to_owned();
        for layer in &mut self.layers {
            y = layer.forward(y.view())?;
        }

        let loss = self.loss.forward(y.view(), targets)?.mean;
        let mut dy = self.loss.backward(y.view(), targets)?;
        for layer in self.layers.iter_mut().rev() {
            dy = layer.backward(dy.view())?;
        }

        self.optimizer.pre_update();
        for (key, layer) in self.layers.iter_mut().enumerate() {
            if let Some(params) = layer.parameters(key)? {
                self.optimizer.update(params)?;
            }
        }
        self.optimizer.post_update();
        self.steps += 1;
        Ok((loss, y))
    }
}

fn apply_layers(layers: &[Box<dyn Layer>], x: ArrayView2<'_, f64>) -> Result<Matrix> {
    let mut y = x.to_owned();
    for layer in layers {
        y = layer.apply(y.view())?;
    }
    Ok(y)
}

impl Model for NeuralNetwork {
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Matrix> {
        if x.nrows() <= PREDICT_CHUNK_ROWS {
            return apply_layers(&self.layers, x);
        }
        let layers = &self.layers[..];
        let chunks = x
            .axis_chunks_iter(Axis(0), PREDICT_CHUNK_ROWS)
            .into_par_iter()
            .map(|chunk| apply_layers(layers, chunk))
            .collect::<Result<Vec<Matrix>>>()?;
        let views: Vec<ArrayView2<'_, f64>> = chunks.iter().map(|c| c.view()).collect();
        ndarray::concatenate(Axis(0), &views)
            .map_err(|e| NnfsError::config(format!("predict: can't reassemble output: {e}")))
    }

    fn fit(
        &mut self,
        x: ArrayView2<'_, f64>,
        targets: &Targets,
        config: &FitConfig,
        callbacks: &mut [&mut dyn Callback],
    ) -> Result<History> {
        config.validate()?;
        let n = x.nrows();
        if n == 0 {
            return Err(NnfsError::config("no training examples"));
        }
        self.check_data(x, targets, "fit targets")?;
        if let Some(validation) = &config.validation {
            self.check_data(validation.x.view(), &validation.targets, "fit validation targets")?;
        }

        let batch_size = config.batch_size;
        let num_batches = (n + batch_size - 1) / batch_size;
        info!(
            "training on {n} examples, {num_batches} batches of up to {batch_size}, for {} epochs",
            config.epochs
        );

        let mut rng = match config.shuffle {
            Shuffle::None => None,
            Shuffle::Seeded(seed) => Some(StdRng::seed_from_u64(seed)),
        };
        let mut order: Vec<usize> = (0..n).collect();
        let mut history = History::default();

        for epoch in 0..config.epochs {
            if let Some(rng) = rng.as_mut() {
                order.shuffle(rng);
            }

            let mut loss_total = 0.0;
            let mut metric_totals = vec![0.0; config.metrics.len()];
            for (b, batch) in order.chunks(batch_size).enumerate() {
                let x_batch = x.select(Axis(0), batch);
                let t_batch = targets.select(batch);
                let (loss, predictions) = self.train_batch(x_batch.view(), &t_batch)?;
                trace!("epoch {epoch} batch {b}: loss={loss:.6}");

                let weight = batch.len() as f64;
                loss_total += loss * weight;
                for (total, metric) in metric_totals.iter_mut().zip(&config.metrics) {
                    *total += metric.compute(predictions.view(), &t_batch)? * weight;
                }
            }

            let mut summary = Summary::new(loss_total / n as f64);
            for (total, metric) in metric_totals.into_iter().zip(&config.metrics) {
                summary.insert(metric.name(), total / n as f64);
            }
            if let Some(penalty) = self.regularization_loss() {
                summary.insert(Summary::REGULARIZATION_LOSS, penalty);
            }
            if let Some(validation) = &config.validation {
                let scores = self.evaluate(validation.x.view(), &validation.targets, &config.metrics)?;
                for (name, value) in scores.iter() {
                    if name != Summary::REGULARIZATION_LOSS {
                        summary.insert(format!("{}{name}", Summary::VALIDATION_PREFIX), value);
                    }
                }
            }
            self.epochs_trained += 1;
            debug!("epoch {epoch} - {summary}");

            let mut keep_going = true;
            for callback in callbacks.iter_mut() {
                keep_going &= callback.on_epoch_end(epoch, &summary)?;
            }
            history.epochs.push(summary);
            if !keep_going {
                if epoch + 1 < config.epochs {
                    warn!("training stopped by a callback after epoch {epoch}");
                    history.stopped_early = true;
                }
                break;
            }
        }

        match history.last() {
            Some(last) => info!("finished {} epochs - {last}", history.epochs.len()),
            None => info!("nothing to train: zero epochs requested"),
        }
        Ok(history)
    }

    fn evaluate(&self, x: ArrayView2<'_, f64>, targets: &Targets, metrics: &[Metric]) -> Result<Summary> {
        let predictions = self.predict(x)?;
        let mut summary = Summary::new(self.loss.forward(predictions.view(), targets)?.mean);
        for metric in metrics {
            summary.insert(metric.name(), metric.compute(predictions.view(), targets)?);
        }
        if let Some(penalty) = self.regularization_loss() {
            summary.insert(Summary::REGULARIZATION_LOSS, penalty);
        }
        Ok(summary)
    }
}

/// Collects layers for a `NeuralNetwork`.
///
/// ```
/// use nnfs::{loss::CceSoftmax, optimizers::Adam, NeuralNetwork};
///
/// let net = NeuralNetwork::builder()
///     .dense(2, 64)
///     .relu()
///     .dense(64, 3)
///     .build(CceSoftmax, Adam::default())
///     .unwrap();
/// assert_eq!(net.output_width(), Some(3));
/// ```
#[derive(Debug, Default)]
pub struct NetworkBuilder {
    layers: Vec<Box<dyn Layer>>,
    /// First mistake made while adding layers, reported by `build`.
    error: Option<NnfsError>,
}

impl NetworkBuilder {
    pub fn layer(mut self, layer: impl Layer + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    /// Append a `Dense` layer with random initial weights. A zero size makes
    /// `build` fail.
    pub fn dense(mut self, num_inputs: usize, num_outputs: usize) -> Self {
        if num_inputs == 0 || num_outputs == 0 {
            self.error.get_or_insert_with(|| {
                NnfsError::config(format!(
                    "Dense layer sizes must be nonzero, got {num_inputs} x {num_outputs}"
                ))
            });
            return self;
        }
        self.layer(Dense::new(num_inputs, num_outputs))
    }

    pub fn relu(self) -> Self {
        self.layer(Activation::new(Relu))
    }

    pub fn sigmoid(self) -> Self {
        self.layer(Activation::new(Sigmoid))
    }

    pub fn tanh(self) -> Self {
        self.layer(Activation::new(Tanh))
    }

    pub fn linear(self) -> Self {
        self.layer(Activation::new(Linear))
    }

    pub fn softmax(self) -> Self {
        self.layer(Activation::new(Softmax))
    }

    pub fn build(
        self,
        loss: impl Loss + 'static,
        optimizer: impl Optimizer + 'static,
    ) -> Result<NeuralNetwork> {
        if let Some(error) = self.error {
            return Err(error);
        }
        NeuralNetwork::new(self.layers, loss, optimizer)
    }
}
