//! Render requests: what to convert and how the converter should be driven.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::domain::types::{ImageFormat, Orientation, RenderTarget};

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("unable to unmarshal json to {target} type: {source}")]
    Malformed {
        target: RenderTarget,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid source url `{url}`: {reason}")]
    InvalidSource { url: String, reason: String },
    #[error("invalid `{field}` option: {reason}")]
    InvalidOption {
        field: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown request type `{0}`")]
    UnknownType(String),
    #[error("stored {target} request is corrupt: {source}")]
    Corrupt {
        target: RenderTarget,
        #[source]
        source: RequestError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
}

/// `wkhtmltopdf` options. Lengths are millimetres.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PdfOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_top: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_bottom: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_left: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_right: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grayscale: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpi: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub javascript_delay: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_javascript: Option<bool>,
}

/// `wkhtmltoimage` options. Dimensions are pixels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<ImageFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_x: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_y: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_w: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_h: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub javascript_delay: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_javascript: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfRenderRequest {
    pub source: Source,
    #[serde(default)]
    pub target: PdfOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRenderRequest {
    pub source: Source,
    #[serde(default)]
    pub target: ImageOptions,
}

/// A conversion request, one variant per supported converter.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderRequest {
    Image(ImageRenderRequest),
    Pdf(PdfRenderRequest),
}

/// Which external converter binary a request runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterProgram {
    Wkhtmltoimage,
    Wkhtmltopdf,
}

impl ConverterProgram {
    pub fn as_str(self) -> &'static str {
        match self {
            ConverterProgram::Wkhtmltoimage => "wkhtmltoimage",
            ConverterProgram::Wkhtmltopdf => "wkhtmltopdf",
        }
    }
}

/// Fully-resolved converter call: `<program> <args..> <source_url> <output_path>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConverterInvocation {
    pub program: ConverterProgram,
    pub args: Vec<String>,
    pub source_url: String,
    pub output_path: PathBuf,
}

impl RenderRequest {
    /// Parse a submission body for the given target and validate it.
    pub fn parse(target: RenderTarget, body: &[u8]) -> Result<Self, RequestError> {
        let malformed = |source| RequestError::Malformed { target, source };
        let request = match target {
            RenderTarget::Image => {
                RenderRequest::Image(serde_json::from_slice(body).map_err(malformed)?)
            }
            RenderTarget::Pdf => RenderRequest::Pdf(serde_json::from_slice(body).map_err(malformed)?),
        };
        request.validate()?;
        Ok(request)
    }

    /// Rebuild a request from its persisted discriminator and payload.
    pub fn decode(request_type: &str, data: &[u8]) -> Result<Self, DecodeError> {
        let target: RenderTarget = request_type
            .parse()
            .map_err(|_| DecodeError::UnknownType(request_type.to_string()))?;

        RenderRequest::parse(target, data).map_err(|source| DecodeError::Corrupt { target, source })
    }

    /// Serialize into the `(request_type, request_data)` pair stored on a job.
    pub fn encode(&self) -> Result<(RenderTarget, Vec<u8>), serde_json::Error> {
        let data = match self {
            RenderRequest::Image(request) => serde_json::to_vec(request)?,
            RenderRequest::Pdf(request) => serde_json::to_vec(request)?,
        };
        Ok((self.target(), data))
    }

    pub fn target(&self) -> RenderTarget {
        match self {
            RenderRequest::Image(_) => RenderTarget::Image,
            RenderRequest::Pdf(_) => RenderTarget::Pdf,
        }
    }

    fn source(&self) -> &Source {
        match self {
            RenderRequest::Image(request) => &request.source,
            RenderRequest::Pdf(request) => &request.source,
        }
    }

    pub fn source_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.source().url)
    }

    /// File name the converter writes inside the scratch directory.
    pub fn output_file_name(&self) -> String {
        match self {
            RenderRequest::Image(request) => {
                let format = request.target.format.unwrap_or_default();
                format!("file.{}", format.as_str())
            }
            RenderRequest::Pdf(_) => "file.pdf".to_string(),
        }
    }

    pub fn invocation(&self, output_dir: &Path) -> ConverterInvocation {
        let (program, args) = match self {
            RenderRequest::Image(request) => {
                (ConverterProgram::Wkhtmltoimage, image_flags(&request.target))
            }
            RenderRequest::Pdf(request) => (ConverterProgram::Wkhtmltopdf, pdf_flags(&request.target)),
        };

        ConverterInvocation {
            program,
            args,
            source_url: self.source().url.clone(),
            output_path: output_dir.join(self.output_file_name()),
        }
    }

    fn validate(&self) -> Result<(), RequestError> {
        let raw = &self.source().url;
        let url = Url::parse(raw).map_err(|err| RequestError::InvalidSource {
            url: raw.clone(),
            reason: err.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RequestError::InvalidSource {
                url: raw.clone(),
                reason: format!("unsupported scheme `{}`", url.scheme()),
            });
        }
        if url.host_str().is_none() {
            return Err(RequestError::InvalidSource {
                url: raw.clone(),
                reason: "missing host".to_string(),
            });
        }

        match self {
            RenderRequest::Image(request) => {
                if request.target.quality.is_some_and(|quality| quality > 100) {
                    return Err(RequestError::InvalidOption {
                        field: "quality",
                        reason: "must be between 0 and 100",
                    });
                }
                if request.target.zoom.is_some_and(|zoom| zoom <= 0.0) {
                    return Err(RequestError::InvalidOption {
                        field: "zoom",
                        reason: "must be greater than zero",
                    });
                }
            }
            RenderRequest::Pdf(request) => {
                if request.target.zoom.is_some_and(|zoom| zoom <= 0.0) {
                    return Err(RequestError::InvalidOption {
                        field: "zoom",
                        reason: "must be greater than zero",
                    });
                }
                if request
                    .target
                    .page_size
                    .as_deref()
                    .is_some_and(|size| size.trim().is_empty())
                {
                    return Err(RequestError::InvalidOption {
                        field: "page_size",
                        reason: "must not be empty",
                    });
                }
            }
        }

        Ok(())
    }
}

fn push_value(args: &mut Vec<String>, flag: &str, value: Option<impl ToString>) {
    if let Some(value) = value {
        args.push(flag.to_string());
        args.push(value.to_string());
    }
}

fn push_switch(args: &mut Vec<String>, flag: &str, enabled: Option<bool>) {
    if enabled == Some(true) {
        args.push(flag.to_string());
    }
}

fn millimetres(value: Option<u32>) -> Option<String> {
    value.map(|value| format!("{value}mm"))
}

fn pdf_flags(options: &PdfOptions) -> Vec<String> {
    let mut args = Vec::new();
    push_value(&mut args, "--margin-top", millimetres(options.margin_top));
    push_value(&mut args, "--margin-bottom", millimetres(options.margin_bottom));
    push_value(&mut args, "--margin-left", millimetres(options.margin_left));
    push_value(&mut args, "--margin-right", millimetres(options.margin_right));
    push_value(&mut args, "--page-height", millimetres(options.page_height));
    push_value(&mut args, "--page-width", millimetres(options.page_width));
    push_value(&mut args, "--page-size", options.page_size.as_deref());
    push_value(
        &mut args,
        "--orientation",
        options.orientation.map(Orientation::as_flag_value),
    );
    push_switch(&mut args, "--grayscale", options.grayscale);
    push_value(&mut args, "--dpi", options.dpi);
    push_value(&mut args, "--zoom", options.zoom);
    push_value(&mut args, "--title", options.title.as_deref());
    push_value(&mut args, "--javascript-delay", options.javascript_delay);
    push_switch(&mut args, "--disable-javascript", options.disable_javascript);
    args
}

fn image_flags(options: &ImageOptions) -> Vec<String> {
    let mut args = Vec::new();
    let format = options.format.unwrap_or_default();
    push_value(&mut args, "--format", Some(format.as_str()));
    push_value(&mut args, "--width", options.width);
    push_value(&mut args, "--height", options.height);
    push_value(&mut args, "--quality", options.quality);
    push_value(&mut args, "--crop-x", options.crop_x);
    push_value(&mut args, "--crop-y", options.crop_y);
    push_value(&mut args, "--crop-w", options.crop_w);
    push_value(&mut args, "--crop-h", options.crop_h);
    push_value(&mut args, "--zoom", options.zoom);
    push_value(&mut args, "--javascript-delay", options.javascript_delay);
    push_switch(&mut args, "--disable-javascript", options.disable_javascript);
    args
}
