// 该文件是 Jianma （鉴码） 项目的一部分。
// src/output/save_image_file.rs - 保存采集图像文件
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, capture::CaptureArtifacts, frame::RgbaFrame, output::Render,
};

/// 以路径为前缀保存 `<prefix>-qr.png`、`<prefix>-cdp.png`，解码文本写入 `<prefix>.txt`
pub struct SaveImageFileOutput {
  prefix: PathBuf,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput::new(uri.path()))
  }
}

impl SaveImageFileOutput {
  pub fn new(prefix: impl Into<PathBuf>) -> Self {
    Self {
      prefix: prefix.into(),
    }
  }

  pub fn path_for(&self, suffix: &str) -> PathBuf {
    self.with_tail(&format!("-{}.png", suffix))
  }

  pub fn text_path(&self) -> PathBuf {
    self.with_tail(".txt")
  }

  fn with_tail(&self, tail: &str) -> PathBuf {
    let mut name = self
      .prefix
      .file_name()
      .map(|n| n.to_os_string())
      .unwrap_or_default();
    name.push(tail);
    self.prefix.with_file_name(name)
  }

  fn create_parent(path: &Path) -> Result<(), SaveImageFileError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(SaveImageFileError::IoError)?;
    }
    Ok(())
  }

  fn save_text(&self, text: &str) -> Result<(), SaveImageFileError> {
    let path = self.text_path();
    Self::create_parent(&path)?;
    std::fs::write(&path, text).map_err(SaveImageFileError::IoError)?;
    warn!("保存解码文本到文件: {}", path.display());
    Ok(())
  }

  fn save_image(&self, path: &Path, frame: &RgbaFrame) -> Result<(), SaveImageFileError> {
    Self::create_parent(path)?;

    frame
      .to_rgba_image()
      .save(path)
      .map_err(SaveImageFileError::ImageError)?;

    warn!("保存图像到文件: {}", path.display());

    Ok(())
  }
}

impl Render<RgbaFrame, CaptureArtifacts> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(
    &self,
    _frame: &RgbaFrame,
    result: &CaptureArtifacts,
  ) -> Result<(), Self::Error> {
    self.save_image(&self.path_for("qr"), &result.qr_crop)?;
    self.save_image(&self.path_for("cdp"), &result.cdp_patch)?;
    self.save_text(&result.text)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    geometry::{BoundingBox, Point2D},
    region::ExtractedRegion,
  };

  #[test]
  fn suffixes_are_appended_to_prefix() {
    let output = SaveImageFileOutput::new("/tmp/captures/scan");
    assert_eq!(
      output.path_for("qr"),
      PathBuf::from("/tmp/captures/scan-qr.png")
    );
    assert_eq!(
      output.path_for("cdp"),
      PathBuf::from("/tmp/captures/scan-cdp.png")
    );
  }

  #[test]
  fn text_sits_next_to_images() {
    let output = SaveImageFileOutput::new("/tmp/captures/scan.v2");
    assert_eq!(output.text_path(), PathBuf::from("/tmp/captures/scan.v2.txt"));
  }

  #[test]
  fn render_writes_images_and_decoded_text() {
    let root = std::env::temp_dir().join(format!("jianma-save-image-{}", std::process::id()));
    let output = SaveImageFileOutput::new(root.join("nested").join("scan"));
    let artifacts = CaptureArtifacts {
      text: "https://example.com/p/42".into(),
      points: vec![Point2D::new(12.0, 12.0), Point2D::new(28.0, 28.0)],
      region: ExtractedRegion::Cropped(BoundingBox::new(10, 10, 20, 20)),
      qr_crop: RgbaFrame::filled(20, 20, [0, 0, 0, 255]),
      cdp_patch: RgbaFrame::filled(8, 8, [128, 128, 128, 255]),
      patch_region: BoundingBox::new(6, 6, 8, 8),
    };
    let frame = RgbaFrame::filled(40, 40, [255, 255, 255, 255]);

    output.render_result(&frame, &artifacts).unwrap();

    assert!(output.path_for("qr").is_file());
    assert!(output.path_for("cdp").is_file());
    assert_eq!(
      std::fs::read_to_string(output.text_path()).unwrap(),
      "https://example.com/p/42"
    );

    std::fs::remove_dir_all(&root).unwrap();
  }
}
