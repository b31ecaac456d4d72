//! PNG saving with workflow metadata and optional caption files

use crate::config::HostConfig;
use crate::data::{ImageBatch, NodeInputs, NodeOutput, RuntimeData, UiFile, UiPayload};
use crate::encoding::TextEncoding;
use crate::nodes::node::{Node, NodeFactory, SyncNode, SyncNodeWrapper};
use crate::nodes::schema::{DataKind, InputSpec, NodeSchema};
use crate::{Error, Result};
use chrono::{Datelike, Local, Timelike};
use image::DynamicImage;
use serde_json::Value;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

pub const NODE_TYPE: &str = "SaveImageCK";

/// Where the next batch of files goes and how they are numbered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavePlan {
    /// Folder the files are written to
    pub folder: PathBuf,
    /// File name stem, may still contain `%batch_num%`
    pub filename: String,
    /// First counter value to use
    pub counter: u32,
    /// Sub-folder (relative to the output folder) reported to the UI
    pub subfolder: String,
}

/// Resolve the `output_folder` input against the host output directory
///
/// Absolute folders are used as-is. `"output"` and `""` mean the host output
/// directory; any other relative folder lives below it.
pub fn resolve_output_folder(output_dir: &Path, output_folder: &str) -> PathBuf {
    let trimmed = output_folder.trim();
    let folder = Path::new(trimmed);
    if folder.is_absolute() {
        folder.to_path_buf()
    } else if trimmed.is_empty() || trimmed == "output" {
        output_dir.to_path_buf()
    } else {
        output_dir.join(folder)
    }
}

/// Substitute `%width%`, `%height%` and date placeholders in a prefix
pub fn expand_prefix(prefix: &str, width: usize, height: usize) -> String {
    let now = Local::now();
    prefix
        .replace("%width%", &width.to_string())
        .replace("%height%", &height.to_string())
        .replace("%year%", &now.year().to_string())
        .replace("%month%", &format!("{:02}", now.month()))
        .replace("%day%", &format!("{:02}", now.day()))
        .replace("%hour%", &format!("{:02}", now.hour()))
        .replace("%minute%", &format!("{:02}", now.minute()))
        .replace("%second%", &format!("{:02}", now.second()))
}

/// Plan file names for a prefix inside `folder`, creating sub-folders
///
/// The counter continues after the highest `{filename}_{NNNNN}_*` file
/// already present.
pub fn plan_save(prefix: &str, folder: &Path, width: usize, height: usize) -> Result<SavePlan> {
    let expanded = expand_prefix(prefix, width, height).replace('\\', "/");
    let mut parts = Vec::new();
    for component in Path::new(&expanded).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => {
                return Err(Error::invalid_input(
                    "filename_prefix",
                    "Saving image outside the output folder is not allowed.",
                ))
            }
        }
    }
    let filename = parts.pop().unwrap_or_default();
    let subfolder = parts.join("/");
    let full_folder = parts.iter().fold(folder.to_path_buf(), |path, part| path.join(part));
    std::fs::create_dir_all(&full_folder)?;

    let counter = next_counter(&full_folder, &filename)?;
    Ok(SavePlan {
        folder: full_folder,
        filename,
        counter,
        subfolder,
    })
}

fn next_counter(folder: &Path, filename: &str) -> Result<u32> {
    let wanted = filename.to_lowercase();
    let mut highest = None;
    for entry in std::fs::read_dir(folder)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        let Some(rest) = strip_prefix_ignore_case(&name, &wanted).and_then(|r| r.strip_prefix('_')) else {
            continue;
        };
        let digits = rest.split('_').next().and_then(|d| d.parse::<u32>().ok()).unwrap_or(0);
        highest = highest.max(Some(digits));
    }
    Ok(highest.map_or(1, |h| h + 1))
}

fn strip_prefix_ignore_case<'a>(name: &'a str, prefix_lower: &str) -> Option<&'a str> {
    let head = name.get(..prefix_lower.len())?;
    (head.to_lowercase() == prefix_lower).then(|| &name[prefix_lower.len()..])
}

/// `json.dumps`-style serialisation: non-ASCII characters are `\u` escaped
///
/// PNG `tEXt` chunks only carry Latin-1.
pub fn to_ascii_json(value: &Value) -> Result<String> {
    let json = serde_json::to_string(value)?;
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    Ok(out)
}

/// Write an image as PNG with `tEXt` metadata chunks
pub fn write_png(path: &Path, image: &DynamicImage, text_chunks: &[(String, String)]) -> Result<()> {
    let color = match image {
        DynamicImage::ImageLuma8(_) => png::ColorType::Grayscale,
        DynamicImage::ImageRgba8(_) => png::ColorType::Rgba,
        DynamicImage::ImageRgb8(_) => png::ColorType::Rgb,
        other => {
            return Err(Error::Image(format!("unsupported color type {:?}", other.color())));
        }
    };

    let writer = BufWriter::new(File::create(path)?);
    let mut encoder = png::Encoder::new(writer, image.width(), image.height());
    encoder.set_color(color);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(png::Compression::Default);
    for (keyword, text) in text_chunks {
        encoder.add_text_chunk(keyword.clone(), text.clone())?;
    }
    let mut writer = encoder.write_header()?;
    writer.write_image_data(image.as_bytes())?;
    writer.finish()?;
    Ok(())
}

/// Write a caption, retrying with UTF-8 when `encoding` cannot represent it
pub fn write_caption(path: &Path, caption: &str, encoding: TextEncoding) -> Result<()> {
    let bytes = match encoding.encode(caption) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %path.display(), "{}, falling back to utf-8", e);
            caption.as_bytes().to_vec()
        }
    };
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Options of one save call
#[derive(Debug, Clone)]
pub struct SaveRequest<'a> {
    pub filename_prefix: &'a str,
    pub output_folder: &'a str,
    pub caption: Option<&'a str>,
    pub caption_extension: &'a str,
    pub encoding: TextEncoding,
    pub prompt: Option<&'a Value>,
    pub extra_pnginfo: Option<&'a Value>,
}

/// Saves image batches to the output folder
pub struct SaveImageNode {
    host: Arc<HostConfig>,
}

impl SaveImageNode {
    pub fn new(host: Arc<HostConfig>) -> Self {
        Self { host }
    }

    fn metadata(&self, request: &SaveRequest<'_>) -> Result<Vec<(String, String)>> {
        if self.host.disable_metadata {
            return Ok(Vec::new());
        }
        let mut chunks = Vec::new();
        if let Some(prompt) = request.prompt {
            chunks.push(("prompt".to_string(), to_ascii_json(prompt)?));
        }
        if let Some(Value::Object(extra)) = request.extra_pnginfo {
            for (key, value) in extra {
                chunks.push((key.clone(), to_ascii_json(value)?));
            }
        }
        Ok(chunks)
    }

    /// Save every image of the batch, returning the saved files
    pub fn save(&self, images: &ImageBatch, request: &SaveRequest<'_>) -> Result<Vec<UiFile>> {
        if images.is_empty() {
            return Err(Error::invalid_input("images", "image batch is empty"));
        }

        let folder = resolve_output_folder(&self.host.output_dir, request.output_folder);
        std::fs::create_dir_all(&folder)?;
        let plan = plan_save(request.filename_prefix, &folder, images.width(), images.height())?;
        let metadata = self.metadata(request)?;

        let mut saved = Vec::with_capacity(images.len());
        let mut counter = plan.counter;
        for batch_number in 0..images.len() {
            let name = plan.filename.replace("%batch_num%", &batch_number.to_string());
            let base = format!("{}_{:05}_", name, counter);
            let file = format!("{}.png", base);
            let image = images.to_dynamic(batch_number)?;
            write_png(&plan.folder.join(&file), &image, &metadata)?;
            tracing::debug!(file = %file, folder = %plan.folder.display(), "Saved image");

            if let Some(caption) = request.caption {
                let caption_path = plan.folder.join(format!("{}{}", base, request.caption_extension));
                write_caption(&caption_path, caption, request.encoding)?;
            }

            saved.push(UiFile::output(file, plan.subfolder.clone()));
            counter += 1;
        }
        Ok(saved)
    }
}

impl SyncNode for SaveImageNode {
    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    fn process(&self, inputs: NodeInputs) -> Result<NodeOutput> {
        let images = inputs.image("images")?;
        let filename_prefix = inputs.text_or("filename_prefix", "ComfyUI")?;
        let output_folder = inputs.text_or("output_folder", "output")?;
        let caption_extension = inputs.text_or("caption_file_extension", ".txt")?;
        let encoding: TextEncoding = inputs.text_or("encoding", "utf-8")?.parse()?;
        let prompt = match inputs.get("prompt") {
            Some(RuntimeData::Json(value)) => Some(value.clone()),
            Some(RuntimeData::Text(text)) => Some(Value::String(text.clone())),
            _ => None,
        };

        let request = SaveRequest {
            filename_prefix: &filename_prefix,
            output_folder: &output_folder,
            caption: inputs.opt_text("caption")?,
            caption_extension: &caption_extension,
            encoding,
            prompt: prompt.as_ref(),
            extra_pnginfo: inputs.json("extra_pnginfo")?,
        };

        let saved = self.save(images, &request)?;
        let last = saved.last().map(|f| f.filename.clone()).unwrap_or_default();
        let ui = UiPayload {
            images: saved,
            ..UiPayload::default()
        };
        Ok(NodeOutput::single(last).with_ui(ui))
    }
}

pub struct SaveImageNodeFactory {
    host: Arc<HostConfig>,
}

impl SaveImageNodeFactory {
    pub fn new(host: Arc<HostConfig>) -> Self {
        Self { host }
    }
}

impl NodeFactory for SaveImageNodeFactory {
    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    fn display_name(&self) -> &str {
        "Save Image (CK)"
    }

    fn schema(&self) -> NodeSchema {
        NodeSchema::new(NODE_TYPE)
            .display_name(self.display_name())
            .description("Saves the input images to your output directory.")
            .function("save_images")
            .input(InputSpec::required("images", DataKind::Image).tooltip("The images to save."))
            .input(
                InputSpec::required("filename_prefix", DataKind::String)
                    .default("ComfyUI")
                    .tooltip("The prefix for the file to save."),
            )
            .input(
                InputSpec::required("output_folder", DataKind::String)
                    .default("output")
                    .tooltip("The folder to save the images to."),
            )
            .input(
                InputSpec::optional("caption_file_extension", DataKind::String)
                    .default(".txt")
                    .tooltip("The extension for the caption file."),
            )
            .input(
                InputSpec::optional("caption", DataKind::String)
                    .force_input()
                    .tooltip("string to save as .txt file"),
            )
            .input(
                InputSpec::optional("encoding", DataKind::String)
                    .choices(TextEncoding::ALL.map(|e| e.as_str()))
                    .tooltip("The encoding to use for the caption file. Use 'gbk' for legacy Windows software in China."),
            )
            .input(InputSpec::hidden("prompt", DataKind::Json))
            .input(InputSpec::hidden("extra_pnginfo", DataKind::Json))
            .output("filename", DataKind::String)
            .output_node()
    }

    fn create(&self, _node_id: String, _params: &Value) -> Result<Box<dyn Node>> {
        Ok(Box::new(SyncNodeWrapper(SaveImageNode::new(Arc::clone(&self.host)))))
    }
}
