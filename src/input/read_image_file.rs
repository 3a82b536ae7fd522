// 该文件是 Jianma （鉴码） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::ImageReader;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbaFrame};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemaMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("无效的重复次数: {0}")]
  InvalidRepeat(String),
}

/// 单张静态图像，按 `?repeat=N` 重复产出 N 帧（默认 1 帧）。
///
/// 重复同一帧可以填满稳定窗口，用于离线验证整条流水线。
pub struct ImageFileInput {
  image: RgbaFrame,
  remaining: usize,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let mut repeat = 1;
    for (k, v) in url.query_pairs() {
      if k == "repeat" {
        repeat = v
          .parse::<usize>()
          .map_err(|_| ImageFileInputError::InvalidRepeat(v.to_string()))?;
      }
    }

    let path = url.path();
    let image = ImageReader::open(path)?.decode()?;
    info!(
      "读取图像文件 {}: {}x{}, 重复 {} 次",
      path,
      image.width(),
      image.height(),
      repeat
    );

    Ok(ImageFileInput::new(RgbaFrame::from(image), repeat))
  }
}

impl ImageFileInput {
  pub fn new(image: RgbaFrame, repeat: usize) -> Self {
    Self {
      image,
      remaining: repeat,
    }
  }
}

impl Iterator for ImageFileInput {
  type Item = RgbaFrame;

  fn next(&mut self) -> Option<Self::Item> {
    if self.remaining == 0 {
      return None;
    }
    self.remaining -= 1;
    Some(self.image.clone())
  }
}
