// 该文件是 Jianma （鉴码） 项目的一部分。
// src/frame.rs - RGBA 帧定义
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

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbaImage};
use thiserror::Error;

use crate::geometry::BoundingBox;

pub const RGBA_CHANNELS: usize = 4;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("区域 {region:?} 超出帧范围 {width}x{height}")]
  RegionOutOfBounds {
    region: BoundingBox,
    width: usize,
    height: usize,
  },
  #[error("PNG 编码错误: {0}")]
  EncodeError(#[from] image::ImageError),
}

/// 交错存储的 RGBA 像素缓冲区。
///
/// 视频帧与裁剪结果共用此类型：帧由输入源产生并按引用交给流水线，
/// 裁剪结果则是新分配、由调用方持有的缓冲区。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaFrame {
  width: usize,
  height: usize,
  data: Box<[u8]>,
}

impl RgbaFrame {
  pub fn with_shape(height: usize, width: usize) -> Self {
    let data = vec![0u8; RGBA_CHANNELS * width * height].into_boxed_slice();
    Self {
      width,
      height,
      data,
    }
  }

  /// 以单一颜色填充的帧
  pub fn filled(width: usize, height: usize, rgba: [u8; 4]) -> Self {
    let data = rgba
      .iter()
      .copied()
      .cycle()
      .take(RGBA_CHANNELS * width * height)
      .collect::<Vec<u8>>();
    Self {
      width,
      height,
      data: data.into_boxed_slice(),
    }
  }

  pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Result<Self, FrameError> {
    let expected = RGBA_CHANNELS * width * height;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn channels(&self) -> usize {
    RGBA_CHANNELS
  }

  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }

  pub fn into_bytes(self) -> Vec<u8> {
    self.data.into_vec()
  }

  #[inline]
  fn offset(&self, x: usize, y: usize) -> usize {
    (y * self.width + x) * RGBA_CHANNELS
  }

  pub fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
    let i = self.offset(x, y);
    [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
  }

  pub fn put_pixel(&mut self, x: usize, y: usize, rgba: [u8; 4]) {
    let i = self.offset(x, y);
    self.data[i..i + RGBA_CHANNELS].copy_from_slice(&rgba);
  }

  /// ITU-R BT.601 亮度
  pub fn luma(&self, x: usize, y: usize) -> u8 {
    let [r, g, b, _] = self.pixel(x, y);
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114 + 500) / 1000) as u8
  }

  /// 按矩形区域复制出新的帧，区域必须完全位于帧内
  pub fn crop(&self, region: &BoundingBox) -> Result<RgbaFrame, FrameError> {
    let (x, y, w, h) = (
      region.x as usize,
      region.y as usize,
      region.w as usize,
      region.h as usize,
    );
    if x + w > self.width || y + h > self.height {
      return Err(FrameError::RegionOutOfBounds {
        region: *region,
        width: self.width,
        height: self.height,
      });
    }

    let row_bytes = w * RGBA_CHANNELS;
    let mut data = Vec::with_capacity(row_bytes * h);
    for row in y..y + h {
      let start = self.offset(x, row);
      data.extend_from_slice(&self.data[start..start + row_bytes]);
    }

    Ok(RgbaFrame {
      width: w,
      height: h,
      data: data.into_boxed_slice(),
    })
  }

  pub fn to_rgba_image(&self) -> RgbaImage {
    // 尺寸与数据长度在构造时已校验
    RgbaImage::from_raw(self.width as u32, self.height as u32, self.data.to_vec())
      .unwrap_or_else(|| RgbaImage::new(self.width as u32, self.height as u32))
  }

  pub fn encode_png(&self) -> Result<Vec<u8>, FrameError> {
    let mut bytes = Cursor::new(Vec::new());
    self
      .to_rgba_image()
      .write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
  }
}

impl AsRef<[u8]> for RgbaFrame {
  fn as_ref(&self) -> &[u8] {
    &self.data
  }
}

impl AsMut<[u8]> for RgbaFrame {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

impl From<RgbaImage> for RgbaFrame {
  fn from(image: RgbaImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width: width as usize,
      height: height as usize,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

impl From<DynamicImage> for RgbaFrame {
  fn from(image: DynamicImage) -> Self {
    RgbaFrame::from(image.into_rgba8())
  }
}
