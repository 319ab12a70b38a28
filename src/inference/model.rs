// Causal language model - next-token logits for every input position
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{linear_no_bias, Linear, VarBuilder};
use candle_transformers::models::qwen2::{Config, Model};
use tracing::info;

use crate::errors::Result;
use crate::hub::ModelFiles;

/// Forward pass over one token sequence
pub trait CausalLm: Send {
    /// Logits of shape `(seq_len, vocab)` as f32 on the CPU
    fn logits(&mut self, input_ids: &[u32]) -> Result<Tensor>;
}

/// Qwen2 decoder with its language-model head
pub struct Qwen2Lm {
    model: Model,
    lm_head: Linear,
    device: Device,
}

impl Qwen2Lm {
    pub fn load(model_path: &str) -> Result<Self> {
        let device = Device::cuda_if_available(0)?;
        let dtype = if device.is_cuda() { DType::BF16 } else { DType::F32 };
        let files = ModelFiles::resolve(model_path)?;

        let config: Config = files.json("config.json")?;
        let weights = files.weights()?;
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&weights, dtype, &device)? };

        let model = Model::new(&config, vb.clone())?;
        let lm_head = if vb.contains_tensor("lm_head.weight") {
            linear_no_bias(config.hidden_size, config.vocab_size, vb.pp("lm_head"))?
        } else {
            // tied embeddings
            let weight = vb
                .pp("model.embed_tokens")
                .get((config.vocab_size, config.hidden_size), "weight")?;
            Linear::new(weight, None)
        };

        info!(model = model_path, device = ?device, "loaded causal LM");
        Ok(Self {
            model,
            lm_head,
            device,
        })
    }
}

impl CausalLm for Qwen2Lm {
    fn logits(&mut self, input_ids: &[u32]) -> Result<Tensor> {
        self.model.clear_kv_cache();
        let input = Tensor::new(input_ids, &self.device)?.unsqueeze(0)?;
        let hidden = self.model.forward(&input, 0, None)?;
        let logits = self
            .lm_head
            .forward(&hidden)?
            .squeeze(0)?
            .to_dtype(DType::F32)?
            .to_device(&Device::Cpu)?;
        Ok(logits)
    }
}
