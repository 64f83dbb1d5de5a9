//! Graph neural networks over the fixed AU adjacency
//!
//! Both models share the same skeleton: a stack of graph layers on the
//! node features, a mean-pool readout over the nodes and a linear head
//! emitting one pain logit per sample. The adjacency matrix is a fixed
//! input, not a parameter.

use crate::config::{ModelKind, TrainConfig};
use crate::error::Result;
use candle_core::{Device, Tensor};
use candle_nn::ops::{dropout, leaky_relu, softmax};
use candle_nn::{linear, linear_no_bias, Linear, Module, VarBuilder};
use ndarray::Array2;

/// Symmetrically normalized adjacency with self loops,
/// D^-1/2 (A + I) D^-1/2. Isolated nodes get a zero row.
pub fn gcn_normalize(adjacency: &Array2<f64>) -> Array2<f64> {
    let n = adjacency.nrows();
    let mut a = adjacency.clone();
    for i in 0..n {
        a[[i, i]] += 1.0;
    }
    let inv_sqrt_degree: Vec<f64> = (0..n)
        .map(|i| {
            let d: f64 = a.row(i).sum();
            if d > 0.0 {
                1.0 / d.sqrt()
            } else {
                0.0
            }
        })
        .collect();
    Array2::from_shape_fn((n, n), |(i, j)| {
        a[[i, j]] * inv_sqrt_degree[i] * inv_sqrt_degree[j]
    })
}

/// Attention mask over edges: 1 where an edge (or self loop) exists.
fn attention_mask(adjacency: &Array2<f64>) -> Array2<f64> {
    Array2::from_shape_fn(adjacency.raw_dim(), |(i, j)| {
        if i == j || adjacency[[i, j]] > 0.0 {
            1.0
        } else {
            0.0
        }
    })
}

fn to_tensor(matrix: &Array2<f64>, device: &Device) -> Result<Tensor> {
    let flat: Vec<f32> = matrix.iter().map(|&v| v as f32).collect();
    Ok(Tensor::from_vec(flat, (matrix.nrows(), matrix.ncols()), device)?)
}

/// Layer widths of the graph stack; an empty configuration derives
/// [d, d/2] from the input feature dimension.
pub fn hidden_dims(configured: &[usize], num_node_features: usize) -> Vec<usize> {
    if configured.is_empty() {
        vec![num_node_features, (num_node_features / 2).max(1)]
    } else {
        configured.to_vec()
    }
}

/// A graph-level binary classifier on per-sample node feature matrices.
pub trait PainClassifier {
    /// Logit for one sample, shape (nodes, features) in, scalar out.
    fn forward_sample(&self, x: &Tensor, train: bool) -> Result<Tensor>;

    /// Human-readable layer listing for the run report.
    fn overview(&self) -> String;

    /// Logits for a batch of samples, shape (batch,).
    fn forward_batch(&self, samples: &[Tensor], train: bool) -> Result<Tensor> {
        let logits = samples
            .iter()
            .map(|x| self.forward_sample(x, train))
            .collect::<Result<Vec<_>>>()?;
        Ok(Tensor::stack(&logits, 0)?)
    }
}

/// Graph convolution network with spectral propagation per layer,
/// X' = relu(A_hat X W).
pub struct Gcn {
    layers: Vec<Linear>,
    a_hat: Tensor,
    head: Linear,
    dims: Vec<usize>,
    dropout: f32,
    dropout_graph: f32,
}

impl Gcn {
    pub fn new(
        adjacency: &Array2<f64>,
        num_node_features: usize,
        config: &TrainConfig,
        vb: VarBuilder,
        device: &Device,
    ) -> Result<Self> {
        let dims = hidden_dims(&config.hidden_channels, num_node_features);
        let a_hat = to_tensor(&gcn_normalize(adjacency), device)?;
        let mut layers = Vec::with_capacity(dims.len());
        let mut in_dim = num_node_features;
        for (i, &out_dim) in dims.iter().enumerate() {
            layers.push(linear(in_dim, out_dim, vb.pp(format!("conv{i}")))?);
            in_dim = out_dim;
        }
        let head = linear(in_dim, 1, vb.pp("head"))?;
        Ok(Self {
            layers,
            a_hat,
            head,
            dims,
            dropout: config.dropout,
            dropout_graph: config.dropout_graph,
        })
    }
}

impl PainClassifier for Gcn {
    fn forward_sample(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let mut x = x.clone();
        for layer in &self.layers {
            x = self.a_hat.matmul(&layer.forward(&x)?)?.relu()?;
            if train && self.dropout_graph > 0.0 {
                x = dropout(&x, self.dropout_graph)?;
            }
        }
        let mut pooled = x.mean(0)?.unsqueeze(0)?;
        if train && self.dropout > 0.0 {
            pooled = dropout(&pooled, self.dropout)?;
        }
        Ok(self.head.forward(&pooled)?.squeeze(0)?.squeeze(0)?)
    }

    fn overview(&self) -> String {
        let mut lines = vec!["GCN".to_string()];
        for (i, dim) in self.dims.iter().enumerate() {
            lines.push(format!("  conv{i}: GCNConv -> {dim}"));
        }
        lines.push("  readout: mean pool".to_string());
        lines.push("  head: Linear -> 1".to_string());
        lines.join("\n")
    }
}

/// One single-head graph attention layer.
struct GatLayer {
    proj: Linear,
    att_src: Linear,
    att_dst: Linear,
}

impl GatLayer {
    fn new(in_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            proj: linear_no_bias(in_dim, out_dim, vb.pp("proj"))?,
            att_src: linear_no_bias(out_dim, 1, vb.pp("att_src"))?,
            att_dst: linear_no_bias(out_dim, 1, vb.pp("att_dst"))?,
        })
    }

    /// Attention scores outside the edge mask are pushed to -1e9 before
    /// the row softmax, so missing edges get negligible weight.
    fn forward(&self, x: &Tensor, mask: &Tensor) -> Result<Tensor> {
        let h = self.proj.forward(x)?;
        let f_src = self.att_src.forward(&h)?;
        let f_dst = self.att_dst.forward(&h)?;
        let e = leaky_relu(&f_src.broadcast_add(&f_dst.t()?)?, 0.2)?;
        let neg = mask.affine(-1.0, 1.0)?.affine(-1e9, 0.0)?;
        let scores = softmax(&((&e * mask)? + neg)?, 1)?;
        Ok(scores.matmul(&h)?)
    }
}

/// Graph attention network with arithmetically masked dense attention.
pub struct Gat {
    layers: Vec<GatLayer>,
    mask: Tensor,
    head: Linear,
    dims: Vec<usize>,
    dropout: f32,
    dropout_graph: f32,
}

impl Gat {
    pub fn new(
        adjacency: &Array2<f64>,
        num_node_features: usize,
        config: &TrainConfig,
        vb: VarBuilder,
        device: &Device,
    ) -> Result<Self> {
        let dims = hidden_dims(&config.hidden_channels, num_node_features);
        let mask = to_tensor(&attention_mask(adjacency), device)?;
        let mut layers = Vec::with_capacity(dims.len());
        let mut in_dim = num_node_features;
        for (i, &out_dim) in dims.iter().enumerate() {
            layers.push(GatLayer::new(in_dim, out_dim, vb.pp(format!("att{i}")))?);
            in_dim = out_dim;
        }
        let head = linear(in_dim, 1, vb.pp("head"))?;
        Ok(Self {
            layers,
            mask,
            head,
            dims,
            dropout: config.dropout,
            dropout_graph: config.dropout_graph,
        })
    }
}

impl PainClassifier for Gat {
    fn forward_sample(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let mut x = x.clone();
        for layer in &self.layers {
            x = layer.forward(&x, &self.mask)?.relu()?;
            if train && self.dropout_graph > 0.0 {
                x = dropout(&x, self.dropout_graph)?;
            }
        }
        let mut pooled = x.mean(0)?.unsqueeze(0)?;
        if train && self.dropout > 0.0 {
            pooled = dropout(&pooled, self.dropout)?;
        }
        Ok(self.head.forward(&pooled)?.squeeze(0)?.squeeze(0)?)
    }

    fn overview(&self) -> String {
        let mut lines = vec!["GAT".to_string()];
        for (i, dim) in self.dims.iter().enumerate() {
            lines.push(format!("  att{i}: GATConv (1 head) -> {dim}"));
        }
        lines.push("  readout: mean pool".to_string());
        lines.push("  head: Linear -> 1".to_string());
        lines.join("\n")
    }
}

/// Instantiates the configured model kind.
pub fn build_model(
    adjacency: &Array2<f64>,
    num_node_features: usize,
    config: &TrainConfig,
    vb: VarBuilder,
    device: &Device,
) -> Result<Box<dyn PainClassifier>> {
    Ok(match config.model {
        ModelKind::Gcn => Box::new(Gcn::new(adjacency, num_node_features, config, vb, device)?),
        ModelKind::Gat => Box::new(Gat::new(adjacency, num_node_features, config, vb, device)?),
    })
}

/// Node feature matrix as an f32 tensor.
pub fn sample_tensor(x: &Array2<f64>, device: &Device) -> Result<Tensor> {
    to_tensor(x, device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;
    use ndarray::array;

    fn test_config(model: ModelKind, hidden: Vec<usize>) -> TrainConfig {
        TrainConfig {
            model,
            hidden_channels: hidden,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_gcn_normalize_symmetric() {
        let a = array![[0.0, 1.0], [1.0, 0.0]];
        let norm = gcn_normalize(&a);
        // both degrees are 2 after self loops
        assert!((norm[[0, 0]] - 0.5).abs() < 1e-12);
        assert!((norm[[0, 1]] - 0.5).abs() < 1e-12);
        assert_eq!(norm[[1, 0]], norm[[0, 1]]);
    }

    #[test]
    fn test_gcn_normalize_isolated_node() {
        let a = array![[0.0, 0.0], [0.0, 0.0]];
        let norm = gcn_normalize(&a);
        // self loop only, degree 1
        assert!((norm[[0, 0]] - 1.0).abs() < 1e-12);
        assert_eq!(norm[[0, 1]], 0.0);
    }

    #[test]
    fn test_hidden_dims_derivation() {
        assert_eq!(hidden_dims(&[], 70), vec![70, 35]);
        assert_eq!(hidden_dims(&[], 1), vec![1, 1]);
        assert_eq!(hidden_dims(&[16, 8], 70), vec![16, 8]);
    }

    #[test]
    fn test_gcn_forward_shapes() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let adjacency = array![[0.0, 0.5, 0.0], [0.5, 0.0, 0.2], [0.0, 0.2, 0.0]];
        let config = test_config(ModelKind::Gcn, vec![4, 2]);
        let model = Gcn::new(&adjacency, 5, &config, vb, &device).unwrap();

        let x = sample_tensor(&Array2::from_elem((3, 5), 0.1), &device).unwrap();
        let logit = model.forward_sample(&x, false).unwrap();
        assert_eq!(logit.dims(), &[] as &[usize]);

        let batch = model.forward_batch(&[x.clone(), x], false).unwrap();
        assert_eq!(batch.dims(), &[2]);
    }

    #[test]
    fn test_gat_forward_shapes() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let adjacency = array![[0.0, 1.0], [1.0, 0.0]];
        let config = test_config(ModelKind::Gat, vec![3]);
        let model = Gat::new(&adjacency, 4, &config, vb, &device).unwrap();

        let x = sample_tensor(&Array2::from_elem((2, 4), 0.5), &device).unwrap();
        let logit = model.forward_sample(&x, false).unwrap();
        assert_eq!(logit.dims(), &[] as &[usize]);
    }

    #[test]
    fn test_overview_lists_layers() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let adjacency = array![[0.0, 1.0], [1.0, 0.0]];
        let config = test_config(ModelKind::Gcn, vec![]);
        let model = Gcn::new(&adjacency, 6, &config, vb, &device).unwrap();
        let text = model.overview();
        assert!(text.contains("GCN"));
        assert!(text.contains("conv0"));
        assert!(text.contains("-> 3"));
    }
}
