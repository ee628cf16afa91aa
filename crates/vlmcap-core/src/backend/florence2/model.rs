//! Florence-2 ONNX sessions and greedy generation.
//!
//! The exported model is split in four graphs: vision encoder, token
//! embedder, text encoder and decoder. Generation re-runs the decoder over
//! the whole prefix at every step (no KV cache), which keeps the graph
//! inputs simple at the cost of speed on long captions.

use std::path::Path;
use std::sync::Mutex;

use image::DynamicImage;
use ort::session::Session;
use ort::value::Value;
use tokenizers::Tokenizer;

use super::preprocess::{preprocess, IMAGE_SIZE};
use super::task::Florence2Task;
use super::{
    DECODER_FILE, EMBED_TOKENS_FILE, ENCODER_FILE, TOKENIZER_FILE, VISION_ENCODER_FILE,
};
use crate::error::{CaptionError, Result};

/// BART `</s>`: end of sequence and decoder start token.
const EOS_TOKEN_ID: i64 = 2;
const DECODER_START_TOKEN_ID: i64 = 2;

/// Loaded Florence-2 graphs plus tokenizer.
///
/// Each session sits behind a `Mutex` because `Session::run` requires `&mut self`.
pub(crate) struct Florence2Model {
    vision: Mutex<Session>,
    embed: Mutex<Session>,
    encoder: Mutex<Session>,
    decoder: Mutex<Session>,
    tokenizer: Tokenizer,
    max_new_tokens: usize,
}

/// A `[1, len, hidden]` float tensor kept as flat data.
struct Hidden {
    len: usize,
    hidden: usize,
    data: Vec<f32>,
}

fn unavailable(message: String) -> CaptionError {
    CaptionError::BackendUnavailable {
        backend: "florence2".to_string(),
        message,
    }
}

fn open_session(path: &Path) -> Result<Mutex<Session>> {
    let session = Session::builder()
        .map_err(|e| unavailable(format!("Failed to create ONNX session builder: {e}")))?
        .commit_from_file(path)
        .map_err(|e| unavailable(format!("Failed to load ONNX model {:?}: {e}", path)))?;

    tracing::debug!(
        "Loaded {:?} (inputs: {:?}, outputs: {:?})",
        path.file_name().unwrap_or_default(),
        session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
        session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>()
    );

    Ok(Mutex::new(session))
}

impl Florence2Model {
    /// Load all graphs and the tokenizer from `dir`.
    pub fn load(dir: &Path, max_new_tokens: usize) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(dir.join(TOKENIZER_FILE))
            .map_err(|e| unavailable(format!("Failed to load tokenizer: {e}")))?;

        Ok(Self {
            vision: open_session(&dir.join(VISION_ENCODER_FILE))?,
            embed: open_session(&dir.join(EMBED_TOKENS_FILE))?,
            encoder: open_session(&dir.join(ENCODER_FILE))?,
            decoder: open_session(&dir.join(DECODER_FILE))?,
            tokenizer,
            max_new_tokens,
        })
    }

    /// Run one task on an image and return the post-processed caption.
    pub fn generate(&self, image: &DynamicImage, task: Florence2Task) -> Result<String> {
        let image_features = self.encode_image(image)?;

        let prompt = self
            .tokenizer
            .encode(task.prompt_text(), true)
            .map_err(|e| CaptionError::inference(format!("Tokenization failed: {e}")))?;
        let prompt_ids: Vec<i64> = prompt.get_ids().iter().map(|&id| id as i64).collect();
        let prompt_embeds = self.embed_tokens(&prompt_ids)?;

        if prompt_embeds.hidden != image_features.hidden {
            return Err(CaptionError::inference(format!(
                "Hidden size mismatch: image {} vs text {}",
                image_features.hidden, prompt_embeds.hidden
            )));
        }

        // Encoder input is the image features followed by the prompt embeddings.
        let mut inputs_embeds = image_features.data;
        inputs_embeds.extend_from_slice(&prompt_embeds.data);
        let encoder_input = Hidden {
            len: image_features.len + prompt_embeds.len,
            hidden: image_features.hidden,
            data: inputs_embeds,
        };
        let encoder_output = self.encode(&encoder_input)?;

        let mut ids = vec![DECODER_START_TOKEN_ID];
        for _ in 0..self.max_new_tokens {
            let next = self.next_token(&ids, &encoder_output)?;
            if next == EOS_TOKEN_ID {
                break;
            }
            ids.push(next);
        }

        let generated: Vec<u32> = ids[1..].iter().map(|&id| id as u32).collect();
        let raw = self
            .tokenizer
            .decode(&generated, false)
            .map_err(|e| CaptionError::inference(format!("Detokenization failed: {e}")))?;
        tracing::trace!("Florence-2 {} raw output: {raw:?}", task.token());

        Ok(task.postprocess(&raw))
    }

    fn encode_image(&self, image: &DynamicImage) -> Result<Hidden> {
        let tensor = preprocess(image, IMAGE_SIZE);
        let shape: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();
        let flat: Vec<f32> = tensor.iter().copied().collect();

        let pixel_values = Value::from_array((shape, flat))
            .map_err(|e| CaptionError::inference(format!("Failed to create pixel tensor: {e}")))?;

        let mut session = self
            .vision
            .lock()
            .map_err(|e| CaptionError::inference(format!("Session lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs!["pixel_values" => pixel_values])
            .map_err(|e| CaptionError::inference(format!("Vision encoder failed: {e}")))?;

        let features = outputs
            .iter()
            .find(|(name, _)| *name == "image_features")
            .ok_or_else(|| CaptionError::inference("Vision encoder did not produce image_features"))?;
        let (shape, data) = features
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| CaptionError::inference(format!("Failed to extract image_features: {e}")))?;

        hidden_from(shape.iter().map(|&d| d as usize).collect(), data.to_vec())
    }

    fn embed_tokens(&self, ids: &[i64]) -> Result<Hidden> {
        let input_ids = Value::from_array((vec![1i64, ids.len() as i64], ids.to_vec()))
            .map_err(|e| CaptionError::inference(format!("Failed to create input_ids: {e}")))?;

        let mut session = self
            .embed
            .lock()
            .map_err(|e| CaptionError::inference(format!("Session lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs!["input_ids" => input_ids])
            .map_err(|e| CaptionError::inference(format!("Token embedding failed: {e}")))?;

        let embeds = outputs
            .iter()
            .find(|(name, _)| *name == "inputs_embeds")
            .ok_or_else(|| CaptionError::inference("Embedder did not produce inputs_embeds"))?;
        let (shape, data) = embeds
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| CaptionError::inference(format!("Failed to extract inputs_embeds: {e}")))?;

        hidden_from(shape.iter().map(|&d| d as usize).collect(), data.to_vec())
    }

    fn encode(&self, input: &Hidden) -> Result<Hidden> {
        let embeds = Value::from_array((
            vec![1i64, input.len as i64, input.hidden as i64],
            input.data.clone(),
        ))
        .map_err(|e| CaptionError::inference(format!("Failed to create encoder input: {e}")))?;
        let mask = Value::from_array((vec![1i64, input.len as i64], vec![1i64; input.len]))
            .map_err(|e| CaptionError::inference(format!("Failed to create attention mask: {e}")))?;

        let mut session = self
            .encoder
            .lock()
            .map_err(|e| CaptionError::inference(format!("Session lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs!["inputs_embeds" => embeds, "attention_mask" => mask])
            .map_err(|e| CaptionError::inference(format!("Encoder failed: {e}")))?;

        let state = outputs
            .iter()
            .find(|(name, _)| *name == "last_hidden_state")
            .ok_or_else(|| CaptionError::inference("Encoder did not produce last_hidden_state"))?;
        let (shape, data) = state.1.try_extract_tensor::<f32>().map_err(|e| {
            CaptionError::inference(format!("Failed to extract last_hidden_state: {e}"))
        })?;

        hidden_from(shape.iter().map(|&d| d as usize).collect(), data.to_vec())
    }

    /// Greedy pick of the token following `ids`.
    fn next_token(&self, ids: &[i64], encoder_output: &Hidden) -> Result<i64> {
        let decoder_embeds = self.embed_tokens(ids)?;

        let inputs_embeds = Value::from_array((
            vec![1i64, decoder_embeds.len as i64, decoder_embeds.hidden as i64],
            decoder_embeds.data,
        ))
        .map_err(|e| CaptionError::inference(format!("Failed to create decoder input: {e}")))?;
        let encoder_hidden_states = Value::from_array((
            vec![1i64, encoder_output.len as i64, encoder_output.hidden as i64],
            encoder_output.data.clone(),
        ))
        .map_err(|e| CaptionError::inference(format!("Failed to create encoder states: {e}")))?;
        let encoder_attention_mask = Value::from_array((
            vec![1i64, encoder_output.len as i64],
            vec![1i64; encoder_output.len],
        ))
        .map_err(|e| CaptionError::inference(format!("Failed to create attention mask: {e}")))?;

        let mut session = self
            .decoder
            .lock()
            .map_err(|e| CaptionError::inference(format!("Session lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "encoder_attention_mask" => encoder_attention_mask,
                "encoder_hidden_states" => encoder_hidden_states,
                "inputs_embeds" => inputs_embeds
            ])
            .map_err(|e| CaptionError::inference(format!("Decoder failed: {e}")))?;

        let logits = outputs
            .iter()
            .find(|(name, _)| *name == "logits")
            .ok_or_else(|| CaptionError::inference("Decoder did not produce logits"))?;
        let (shape, data) = logits
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| CaptionError::inference(format!("Failed to extract logits: {e}")))?;

        // logits is [1, T, vocab]; only the last position matters.
        let vocab = match shape.len() {
            3 => shape[2] as usize,
            _ => {
                return Err(CaptionError::inference(format!(
                    "Unexpected logits shape: {:?}",
                    shape
                )))
            }
        };
        let last = data
            .len()
            .checked_sub(vocab)
            .map(|offset| &data[offset..])
            .ok_or_else(|| CaptionError::inference("Decoder returned empty logits"))?;

        Ok(argmax(last) as i64)
    }
}

/// Interpret a `[1, len, hidden]` output.
fn hidden_from(shape: Vec<usize>, data: Vec<f32>) -> Result<Hidden> {
    match shape.as_slice() {
        [1, len, hidden] => Ok(Hidden {
            len: *len,
            hidden: *hidden,
            data,
        }),
        other => Err(CaptionError::inference(format!(
            "Unexpected hidden state shape: {other:?}"
        ))),
    }
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best_idx, best), (idx, &v)| {
            if v > best {
                (idx, v)
            } else {
                (best_idx, best)
            }
        })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_picks_first_maximum() {
        assert_eq!(argmax(&[0.1, 0.9, 0.3, 0.9]), 1);
        assert_eq!(argmax(&[-2.0, -1.0]), 1);
    }

    #[test]
    fn test_hidden_from_accepts_batch_of_one() {
        let hidden = hidden_from(vec![1, 2, 3], vec![0.0; 6]).unwrap();
        assert_eq!(hidden.len, 2);
        assert_eq!(hidden.hidden, 3);
    }

    #[test]
    fn test_hidden_from_rejects_other_shapes() {
        assert!(hidden_from(vec![2, 2, 3], vec![0.0; 12]).is_err());
        assert!(hidden_from(vec![6], vec![0.0; 6]).is_err());
    }

    #[test]
    fn test_load_missing_dir_is_unavailable() {
        let err = Florence2Model::load(Path::new("/nonexistent/florence"), 16)
            .err()
            .unwrap();
        assert!(matches!(err, CaptionError::BackendUnavailable { .. }));
    }
}
