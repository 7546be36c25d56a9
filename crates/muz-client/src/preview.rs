//! Live-preview extraction for assistant replies that contain web code.

/// HTML page assembled from fenced code blocks of an assistant reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodePreview {
    pub html: String,
    pub css: Option<String>,
    pub js: Option<String>,
}

impl CodePreview {
    /// Pull the first ```` ```html ```` block and, if present, the first
    /// ```` ```css ```` and ```` ```js ````/```` ```javascript ```` blocks.
    /// Returns `None` when there is no html block.
    pub fn extract(text: &str) -> Option<Self> {
        let blocks = fenced_blocks(text);
        let first = |tags: &[&str]| {
            blocks
                .iter()
                .find(|(tag, _)| tags.contains(&tag.as_str()))
                .map(|(_, body)| body.clone())
        };

        let html = first(&["html"])?;
        Some(Self {
            html,
            css: first(&["css"]),
            js: first(&["js", "javascript"]),
        })
    }

    /// Standalone document ready to load into a preview frame.
    pub fn document(&self) -> String {
        let style = self
            .css
            .as_deref()
            .map(|css| format!("<style>\n{css}\n</style>\n"))
            .unwrap_or_default();
        let script = self
            .js
            .as_deref()
            .map(|js| format!("<script>\n{js}\n</script>\n"))
            .unwrap_or_default();
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n{style}</head>\n<body>\n{}\n{script}</body>\n</html>\n",
            self.html
        )
    }
}

/// `(lowercased tag, body)` for every closed fenced block.
fn fenced_blocks(text: &str) -> Vec<(String, String)> {
    let mut blocks = Vec::new();
    let mut open: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        match open.take() {
            None => {
                if let Some(info) = trimmed.strip_prefix("```") {
                    open = Some((info.trim().to_ascii_lowercase(), Vec::new()));
                }
            }
            Some((tag, mut body)) => {
                if trimmed.trim_end() == "```" {
                    blocks.push((tag, body.join("\n")));
                } else {
                    body.push(line);
                    open = Some((tag, body));
                }
            }
        }
    }
    blocks
}
