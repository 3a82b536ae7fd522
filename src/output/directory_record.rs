// 该文件是 Jianma （鉴码） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::{
  path::PathBuf,
  sync::atomic::{AtomicU32, Ordering},
};

use chrono::{DateTime, Datelike, Utc};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;

use crate::{
  FromUrl, FromUrlWithScheme,
  capture::CaptureArtifacts,
  frame::RgbaFrame,
  output::{Render, draw::Draw},
  region::ExtractedRegion,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 每次采集写入 `<dir>/YYYY/MM/DD/HH-MM-SS-XXXX/`，包含
/// `qr.png`、`cdp.png`、`record.json`，以及 `?annotate` 时的 `frame.png`。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  annotate: Option<Draw>,
  capture_counter: AtomicU32,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let annotate = uri.query_pairs().any(|(k, _)| k == "annotate");

    Ok(DirectoryRecordOutput::new(uri.path(), annotate))
  }
}

/// 采集记录的 JSON 内容
pub fn capture_record(result: &CaptureArtifacts, captured_at: &DateTime<Utc>) -> Value {
  let points: Vec<[f64; 2]> = result.points.iter().map(|p| [p.x, p.y]).collect();
  let region = match &result.region {
    ExtractedRegion::Cropped(b) => json!({
      "strategy": "bounding",
      "x": b.x,
      "y": b.y,
      "width": b.w,
      "height": b.h,
    }),
    ExtractedRegion::Warped {
      corners,
      homography,
      side,
    } => json!({
      "strategy": "perspective",
      "side": side,
      "corners": corners.to_array().map(|p| [p.x, p.y]),
      "homography": homography.coefficients(),
    }),
  };
  let patch = &result.patch_region;

  json!({
    "text": result.text,
    "captured_at": captured_at.to_rfc3339(),
    "points": points,
    "region": region,
    "qr": {
      "width": result.qr_crop.width(),
      "height": result.qr_crop.height(),
    },
    "cdp": {
      "x": patch.x,
      "y": patch.y,
      "width": patch.w,
      "height": patch.h,
    },
  })
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>, annotate: bool) -> Self {
    Self {
      directory: directory.into(),
      annotate: annotate.then(Draw::default),
      capture_counter: AtomicU32::new(0),
    }
  }

  fn capture_id(&self) -> u32 {
    self.capture_counter.fetch_add(1, Ordering::Relaxed) + 1
  }

  fn capture_path(&self, now: &DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()))
      .join(format!(
        "{}-{:04X}",
        now.format("%H-%M-%S"),
        self.capture_id()
      ));
    std::fs::create_dir_all(&directory)?;
    Ok(directory)
  }

  /// 写入一次采集，返回其所在目录
  pub fn record(
    &self,
    frame: &RgbaFrame,
    result: &CaptureArtifacts,
  ) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self.capture_path(&now)?;

    result.qr_crop.to_rgba_image().save(directory.join("qr.png"))?;
    result
      .cdp_patch
      .to_rgba_image()
      .save(directory.join("cdp.png"))?;

    let record = capture_record(result, &now);
    std::fs::write(
      directory.join("record.json"),
      serde_json::to_string_pretty(&record)?,
    )?;

    if let Some(draw) = &self.annotate {
      draw
        .draw_capture(frame, result)
        .save(directory.join("frame.png"))?;
    }

    info!("采集已记录到目录: {}", directory.display());
    Ok(directory)
  }
}

impl Render<RgbaFrame, CaptureArtifacts> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(
    &self,
    frame: &RgbaFrame,
    result: &CaptureArtifacts,
  ) -> Result<(), Self::Error> {
    self.record(frame, result)?;
    Ok(())
  }
}
