//! Multi-layer perceptron with a sigmoid output unit, built on burn
//!
//! Training runs on the autodiff NdArray backend: Adam with L2 weight decay
//! minimizes class-weighted binary cross-entropy on the output logit. Fitted
//! weights are exported as plain dense layers so the model serializes with the
//! rest of the bundle; inference rebuilds the burn module from them.

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::module::{AutodiffModule, Module, Param};
use burn::nn::loss::BinaryCrossEntropyLossConfig;
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::Backend;
use burn::tensor::{activation, Int, Tensor, TensorData};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{log_loss, Classifier, Monitor};

type TrainBackend = Autodiff<NdArray<f32>>;
type InferBackend = NdArray<f32>;

/// Epochs without training-loss improvement before stopping, when no monitor is given
const N_ITER_NO_CHANGE: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Relu,
    Tanh,
}

impl Activation {
    fn apply<B: Backend>(self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            Activation::Relu => activation::relu(x),
            Activation::Tanh => activation::tanh(x),
        }
    }
}

impl std::fmt::Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Activation::Relu => write!(f, "relu"),
            Activation::Tanh => write!(f, "tanh"),
        }
    }
}

/// MLP hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpParams {
    pub hidden_layers: Vec<usize>,
    pub activation: Activation,
    pub learning_rate_init: f64,
    /// L2 penalty
    pub alpha: f64,
    pub batch_size: usize,
    /// Maximum training epochs
    pub max_iter: usize,
    /// Loss weight of positive rows
    pub positive_class_weight: f64,
    /// Minimum loss improvement that resets the patience counter
    pub tol: f64,
}

impl Default for MlpParams {
    fn default() -> Self {
        Self {
            hidden_layers: vec![128, 64],
            activation: Activation::Relu,
            learning_rate_init: 1e-3,
            alpha: 1e-4,
            batch_size: 200,
            max_iter: 200,
            positive_class_weight: 1.0,
            tol: 1e-4,
        }
    }
}

/// Feed-forward network: hidden layers with a shared activation, then one logit
#[derive(Module, Debug)]
struct Network<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
}

impl<B: Backend> Network<B> {
    /// Output logits, shape `[batch, 1]`
    fn forward(&self, input: Tensor<B, 2>, activation: Activation) -> Tensor<B, 2> {
        let x = self
            .hidden
            .iter()
            .fold(input, |x, layer| activation.apply(layer.forward(x)));
        self.output.forward(x)
    }

    fn probabilities(&self, rows: &[&[f64]], activation: Activation, device: &B::Device) -> Vec<f64> {
        if rows.is_empty() {
            return Vec::new();
        }
        let logits = self.forward(batch_tensor(rows, device), activation);
        activation::sigmoid(logits)
            .into_data()
            .iter::<f32>()
            .map(f64::from)
            .collect()
    }
}

fn batch_tensor<B: Backend>(rows: &[&[f64]], device: &B::Device) -> Tensor<B, 2> {
    let width = rows.first().map_or(0, |r| r.len());
    let values: Vec<f32> = rows.iter().flat_map(|r| r.iter().map(|&v| v as f32)).collect();
    Tensor::from_data(TensorData::new(values, [rows.len(), width]), device)
}

/// Dense layer in burn's layout: weights row-major as `n_in x n_out`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub n_in: usize,
    pub n_out: usize,
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
}

impl Layer {
    /// Glorot-uniform weights and biases drawn from the fit's own RNG
    fn glorot(n_in: usize, n_out: usize, factor: f64, rng: &mut ChaCha8Rng) -> Self {
        let bound = (factor / (n_in + n_out) as f64).sqrt();
        let mut draw = |len: usize| -> Vec<f32> { (0..len).map(|_| rng.gen_range(-bound..bound) as f32).collect() };
        let weights = draw(n_in * n_out);
        let biases = draw(n_out);
        Self {
            n_in,
            n_out,
            weights,
            biases,
        }
    }

    fn to_linear<B: Backend>(&self, device: &B::Device) -> Linear<B> {
        let mut linear = LinearConfig::new(self.n_in, self.n_out)
            .with_initializer(Initializer::Zeros)
            .init(device);
        linear.weight = Param::from_tensor(Tensor::from_data(
            TensorData::new(self.weights.clone(), [self.n_in, self.n_out]),
            device,
        ));
        linear.bias = Some(Param::from_tensor(Tensor::from_data(
            TensorData::new(self.biases.clone(), [self.n_out]),
            device,
        )));
        linear
    }

    fn from_linear<B: Backend>(linear: &Linear<B>) -> Self {
        let [n_in, n_out] = linear.weight.dims();
        let weights = linear.weight.val().into_data().iter::<f32>().collect();
        let biases = match &linear.bias {
            Some(bias) => bias.val().into_data().iter::<f32>().collect(),
            None => vec![0.0; n_out],
        };
        Self {
            n_in,
            n_out,
            weights,
            biases,
        }
    }
}

/// Fitted network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpClassifier {
    pub activation: Activation,
    pub hidden: Vec<Layer>,
    pub output: Layer,
    /// Epochs actually run
    pub n_iter: usize,
}

impl MlpClassifier {
    fn network<B: Backend>(&self, device: &B::Device) -> Network<B> {
        Network {
            hidden: self.hidden.iter().map(|l| l.to_linear(device)).collect(),
            output: self.output.to_linear(device),
        }
    }

    fn export(&mut self, network: &Network<InferBackend>) {
        self.hidden = network.hidden.iter().map(Layer::from_linear).collect();
        self.output = Layer::from_linear(&network.output);
    }

    fn probabilities(&self, rows: &[&[f64]]) -> Vec<f64> {
        let device = NdArrayDevice::default();
        self.network::<InferBackend>(&device)
            .probabilities(rows, self.activation, &device)
    }

    /// Train on `rows`; with a monitor, keep the weights of the best
    /// held-out epoch and stop after `patience` epochs without improvement.
    pub fn fit(params: &MlpParams, rows: &[&[f64]], labels: &[u8], monitor: Option<&Monitor<'_>>, seed: u64) -> Self {
        let n = rows.len();
        let n_features = rows.first().map_or(0, |r| r.len());
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let mut sizes = vec![n_features];
        sizes.extend(params.hidden_layers.iter().copied().filter(|&s| s > 0));
        let hidden: Vec<Layer> = sizes
            .windows(2)
            .map(|w| Layer::glorot(w[0], w[1], 6.0, &mut rng))
            .collect();
        let output = Layer::glorot(sizes[sizes.len() - 1], 1, 2.0, &mut rng);
        let mut model = Self {
            activation: params.activation,
            hidden,
            output,
            n_iter: 0,
        };
        if n == 0 {
            return model;
        }

        let device = NdArrayDevice::default();
        let mut net: Network<TrainBackend> = model.network(&device);
        let mut optim = AdamConfig::new()
            .with_weight_decay(Some(WeightDecayConfig::new(params.alpha as f32)))
            .init::<TrainBackend, Network<TrainBackend>>();
        let loss_fn = BinaryCrossEntropyLossConfig::new()
            .with_logits(true)
            .with_weights(Some(vec![1.0, params.positive_class_weight as f32]))
            .init::<TrainBackend>(&device);

        let batch_size = params.batch_size.clamp(1, n);
        let mut best_loss = f64::INFINITY;
        let mut best: Option<Network<TrainBackend>> = None;
        let mut stale = 0usize;
        let mut order: Vec<usize> = (0..n).collect();

        for epoch in 0..params.max_iter {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(batch_size) {
                let batch_rows: Vec<&[f64]> = batch.iter().map(|&i| rows[i]).collect();
                let targets: Vec<i64> = batch.iter().map(|&i| i64::from(labels[i])).collect();
                let targets =
                    Tensor::<TrainBackend, 1, Int>::from_data(TensorData::new(targets, [batch.len()]), &device);

                let logits = net
                    .forward(batch_tensor(&batch_rows, &device), params.activation)
                    .reshape([batch.len()]);
                let loss = loss_fn.forward(logits, targets);
                epoch_loss += f64::from(loss.clone().into_scalar()) * batch.len() as f64;

                let grads = GradientsParams::from_grads(loss.backward(), &net);
                net = optim.step(params.learning_rate_init, net, grads);
            }
            model.n_iter = epoch + 1;

            let (loss, patience) = match monitor {
                Some(m) => {
                    let probs = net.valid().probabilities(&m.rows, params.activation, &device);
                    (log_loss(&probs, &m.labels), m.patience)
                }
                None => (epoch_loss / n as f64, N_ITER_NO_CHANGE),
            };
            if loss < best_loss - params.tol {
                best_loss = loss;
                stale = 0;
                if monitor.is_some() {
                    best = Some(net.clone());
                }
            } else {
                stale += 1;
                if stale >= patience {
                    debug!(epoch, "MLP training converged or stopped early");
                    break;
                }
            }
        }

        model.export(&best.unwrap_or(net).valid());
        model
    }
}

impl Classifier for MlpClassifier {
    fn predict_proba(&self, row: &[f64]) -> f64 {
        self.probabilities(&[row]).first().copied().unwrap_or(0.5)
    }

    fn n_features(&self) -> usize {
        self.hidden.first().map_or(self.output.n_in, |l| l.n_in)
    }

    /// One batched forward pass instead of a network per row
    fn predict_batch(&self, rows: &[Vec<f64>]) -> Vec<f64>
    where
        Self: Sync,
    {
        let refs: Vec<&[f64]> = rows.iter().map(Vec::as_slice).collect();
        self.probabilities(&refs)
    }
}
