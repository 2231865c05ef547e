//! Job graph model and encoder.
//!
//! A ComfyUI job ("prompt") is a map from node id to a node record of the
//! shape `{"class_type": "...", "inputs": {...}}`. Inputs are either
//! literals or links `["<node id>", <output slot>]` to another node's
//! output. [`Node`] models each node kind the portrait pipeline uses as a
//! typed variant so every input is checked at compile time.
//!
//! [`encode_workflow`] builds the fixed pipeline
//! `checkpoint -> prompt encode -> sample -> decode -> save`, with either
//! an empty latent (text-to-image) or an uploaded image (image-to-image)
//! as the sampler input.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use miniyou_core::style::Style;

/// Identifier of a node within a [`Workflow`].
pub type NodeId = String;

/// Checkpoint shipped with a stock ComfyUI install.
pub const DEFAULT_CHECKPOINT: &str = "sd_v1-5-pruned-emaonly.ckpt";
/// Native SD 1.5 latent resolution.
pub const DEFAULT_IMAGE_SIZE: u32 = 512;
pub const DEFAULT_SAMPLER: &str = "euler";
pub const DEFAULT_SCHEDULER: &str = "normal";
pub const DEFAULT_FILENAME_PREFIX: &str = "miniyou";

/// Output slots of `CheckpointLoaderSimple`.
pub mod checkpoint_slot {
    pub const MODEL: u32 = 0;
    pub const CLIP: u32 = 1;
    pub const VAE: u32 = 2;
}

// Fixed node ids of the portrait pipeline.
const CHECKPOINT: &str = "1";
const POSITIVE: &str = "2";
const NEGATIVE: &str = "3";
const LATENT_SOURCE: &str = "4";
const SAMPLER: &str = "5";
const DECODE: &str = "6";
const SAVE: &str = "7";
const ENCODE_INPUT: &str = "8";

// ---------------------------------------------------------------------------
// Graph model
// ---------------------------------------------------------------------------

/// Reference to output slot `.1` of node `.0`. Serialized as a two-element
/// array, matching the ComfyUI wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link(pub NodeId, pub u32);

impl Link {
    pub fn new(node: &str, slot: u32) -> Self {
        Self(node.to_string(), slot)
    }

    pub fn node(&self) -> &str {
        &self.0
    }

    pub fn slot(&self) -> u32 {
        self.1
    }
}

/// Every node kind the portrait pipeline emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class_type", content = "inputs")]
pub enum Node {
    CheckpointLoaderSimple {
        ckpt_name: String,
    },
    #[serde(rename = "CLIPTextEncode")]
    ClipTextEncode {
        text: String,
        clip: Link,
    },
    EmptyLatentImage {
        width: u32,
        height: u32,
        batch_size: u32,
    },
    LoadImage {
        image: String,
    },
    #[serde(rename = "VAEEncode")]
    VaeEncode {
        pixels: Link,
        vae: Link,
    },
    KSampler {
        seed: u64,
        steps: u32,
        cfg: f32,
        sampler_name: String,
        scheduler: String,
        denoise: f32,
        model: Link,
        positive: Link,
        negative: Link,
        latent_image: Link,
    },
    #[serde(rename = "VAEDecode")]
    VaeDecode {
        samples: Link,
        vae: Link,
    },
    SaveImage {
        filename_prefix: String,
        images: Link,
    },
}

impl Node {
    /// Links to other nodes' outputs consumed by this node.
    pub fn links(&self) -> Vec<&Link> {
        match self {
            Node::CheckpointLoaderSimple { .. }
            | Node::EmptyLatentImage { .. }
            | Node::LoadImage { .. } => Vec::new(),
            Node::ClipTextEncode { clip, .. } => vec![clip],
            Node::VaeEncode { pixels, vae } => vec![pixels, vae],
            Node::KSampler {
                model,
                positive,
                negative,
                latent_image,
                ..
            } => vec![model, positive, negative, latent_image],
            Node::VaeDecode { samples, vae } => vec![samples, vae],
            Node::SaveImage { images, .. } => vec![images],
        }
    }
}

/// Structural problems in a job graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    /// A node links to a node id that is not in the graph.
    #[error("Node {from} references missing node {missing}")]
    DanglingReference { from: NodeId, missing: NodeId },

    /// The links form a cycle through the given node.
    #[error("Cycle detected through node {0}")]
    Cycle(NodeId),
}

/// A complete job graph, serialized as the bare node map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Workflow {
    nodes: BTreeMap<NodeId, Node>,
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the node stored under `id`.
    pub fn insert(&mut self, id: &str, node: Node) -> &mut Self {
        self.nodes.insert(id.to_string(), node);
        self
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Node)> {
        self.nodes.iter()
    }

    /// Check that every link resolves and that the graph is acyclic.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        for (id, node) in &self.nodes {
            for link in node.links() {
                if !self.nodes.contains_key(link.node()) {
                    return Err(WorkflowError::DanglingReference {
                        from: id.clone(),
                        missing: link.node().to_string(),
                    });
                }
            }
        }

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            graph: &'a BTreeMap<NodeId, Node>,
            id: &'a str,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<(), WorkflowError> {
            match marks.get(id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => return Err(WorkflowError::Cycle(id.to_string())),
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            if let Some(node) = graph.get(id) {
                for link in node.links() {
                    visit(graph, link.node(), marks)?;
                }
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        let mut marks = HashMap::new();
        for id in self.nodes.keys() {
            visit(&self.nodes, id, &mut marks)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Style-independent parameters of the generated pipeline.
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub checkpoint: String,
    /// Latent width/height for text-to-image.
    pub image_size: u32,
    pub sampler_name: String,
    pub scheduler: String,
    pub filename_prefix: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            checkpoint: DEFAULT_CHECKPOINT.to_string(),
            image_size: DEFAULT_IMAGE_SIZE,
            sampler_name: DEFAULT_SAMPLER.to_string(),
            scheduler: DEFAULT_SCHEDULER.to_string(),
            filename_prefix: DEFAULT_FILENAME_PREFIX.to_string(),
        }
    }
}

/// Encoder output: the graph plus the parameters the caller needs to
/// reproduce it.
#[derive(Debug, Clone)]
pub struct EncodedWorkflow {
    pub workflow: Workflow,
    /// Style actually applied (after falling back from unknown ids).
    pub style: Style,
    pub seed: u64,
}

/// Draw a sampler seed from the 32-bit unsigned range.
pub fn random_seed() -> u64 {
    u64::from(rand::random::<u32>())
}

/// Build the portrait pipeline for `style_id`.
///
/// * `input_image` - server-side name of an uploaded image. When present
///   the sampler starts from the encoded image with the style's denoise
///   strength; otherwise it starts from an empty latent at full denoise.
/// * `seed` - pins the sampler seed; a random one is drawn when `None`.
///
/// Unknown style ids fall back to the default style.
pub fn encode_workflow(
    settings: &EncoderSettings,
    style_id: &str,
    input_image: Option<&str>,
    seed: Option<u64>,
) -> Result<EncodedWorkflow, WorkflowError> {
    let style = Style::resolve(style_id);
    let config = style.config();
    let seed = seed.unwrap_or_else(random_seed);

    let mut workflow = Workflow::new();
    workflow
        .insert(
            CHECKPOINT,
            Node::CheckpointLoaderSimple {
                ckpt_name: settings.checkpoint.clone(),
            },
        )
        .insert(
            POSITIVE,
            Node::ClipTextEncode {
                text: style.positive_prompt(),
                clip: Link::new(CHECKPOINT, checkpoint_slot::CLIP),
            },
        )
        .insert(
            NEGATIVE,
            Node::ClipTextEncode {
                text: config.negative_prompt.to_string(),
                clip: Link::new(CHECKPOINT, checkpoint_slot::CLIP),
            },
        );

    let (latent, denoise) = match input_image {
        Some(image) => {
            workflow
                .insert(
                    LATENT_SOURCE,
                    Node::LoadImage {
                        image: image.to_string(),
                    },
                )
                .insert(
                    ENCODE_INPUT,
                    Node::VaeEncode {
                        pixels: Link::new(LATENT_SOURCE, 0),
                        vae: Link::new(CHECKPOINT, checkpoint_slot::VAE),
                    },
                );
            (Link::new(ENCODE_INPUT, 0), config.strength)
        }
        None => {
            workflow.insert(
                LATENT_SOURCE,
                Node::EmptyLatentImage {
                    width: settings.image_size,
                    height: settings.image_size,
                    batch_size: 1,
                },
            );
            (Link::new(LATENT_SOURCE, 0), 1.0)
        }
    };

    workflow
        .insert(
            SAMPLER,
            Node::KSampler {
                seed,
                steps: config.steps,
                cfg: config.guidance_scale,
                sampler_name: settings.sampler_name.clone(),
                scheduler: settings.scheduler.clone(),
                denoise,
                model: Link::new(CHECKPOINT, checkpoint_slot::MODEL),
                positive: Link::new(POSITIVE, 0),
                negative: Link::new(NEGATIVE, 0),
                latent_image: latent,
            },
        )
        .insert(
            DECODE,
            Node::VaeDecode {
                samples: Link::new(SAMPLER, 0),
                vae: Link::new(CHECKPOINT, checkpoint_slot::VAE),
            },
        )
        .insert(
            SAVE,
            Node::SaveImage {
                filename_prefix: format!("{}_{}", settings.filename_prefix, style.id()),
                images: Link::new(DECODE, 0),
            },
        );

    workflow.validate()?;

    Ok(EncodedWorkflow {
        workflow,
        style,
        seed,
    })
}
