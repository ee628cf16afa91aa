//! Florence-2 task directives.
//!
//! Florence-2 is driven by task tokens rather than free text, so the
//! free-text prompt is mapped to one of a few directives.

/// A Florence-2 task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Florence2Task {
    DetailedCaption,
    MoreDetailedCaption,
    /// Object detection; the caption is the list of detected labels.
    ObjectDetection,
}

impl Florence2Task {
    /// Map a free-text prompt to a task.
    ///
    /// "detail" → more detailed caption, "brief" → detailed caption,
    /// "tags" → object detection. Anything else falls back to the detailed
    /// caption.
    pub fn from_prompt(prompt: &str) -> Self {
        let prompt = prompt.to_lowercase();
        if prompt.contains("detail") {
            Self::MoreDetailedCaption
        } else if prompt.contains("brief") {
            Self::DetailedCaption
        } else if prompt.contains("tags") {
            // Labels come back in detection order, not by relevance.
            Self::ObjectDetection
        } else {
            Self::DetailedCaption
        }
    }

    /// The task token as Florence-2 names it.
    pub fn token(self) -> &'static str {
        match self {
            Self::DetailedCaption => "<DETAILED_CAPTION>",
            Self::MoreDetailedCaption => "<MORE_DETAILED_CAPTION>",
            Self::ObjectDetection => "<OD>",
        }
    }

    /// Text fed to the encoder for this task.
    pub fn prompt_text(self) -> &'static str {
        match self {
            Self::DetailedCaption => "Describe in detail what is shown in the image.",
            Self::MoreDetailedCaption => "Describe with a paragraph what is shown in the image.",
            Self::ObjectDetection => "Locate the objects with category name in the image.",
        }
    }

    /// Turn raw decoder text (special tokens included) into a caption.
    pub fn postprocess(self, raw: &str) -> String {
        let text = strip_special_tokens(raw);
        match self {
            Self::ObjectDetection => object_labels(&text).join(", "),
            _ => text.trim().to_string(),
        }
    }
}

fn strip_special_tokens(raw: &str) -> String {
    raw.replace("<s>", "").replace("</s>", "").replace("<pad>", "")
}

/// Labels from `label<loc_x1><loc_y1><loc_x2><loc_y2>...` output, first
/// occurrence order, without duplicates. Text without a box is dropped.
fn object_labels(text: &str) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("<loc_") {
        let label = rest[..start].trim();
        if !label.is_empty() && !labels.iter().any(|l| l == label) {
            labels.push(label.to_string());
        }
        rest = match rest[start..].find('>') {
            Some(end) => &rest[start + end + 1..],
            None => "",
        };
    }

    labels
}
