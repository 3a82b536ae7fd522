// 该文件是 Jianma （鉴码） 项目的一部分。
// src/enhance.rs - 确定性图像增强
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

//! 所有滤波器都作用于交错 RGBA 缓冲区，只处理颜色通道，alpha 原样保留。
//! 滤波器是纯函数，不在调用之间保留状态，相同输入总得到相同输出。

use std::{convert::Infallible, future::Future};

use image::imageops::{self, FilterType};
use tracing::debug;

use crate::frame::{RGBA_CHANNELS, RgbaFrame};

const COLOR_CHANNELS: usize = 3;

/// 经典高通锐化核的中心权重
pub const CLASSIC_SHARPEN_CENTER: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Sharpen {
  #[default]
  None,
  /// 固定 3×3 核 `[[0,-1,0],[-1,k,-1],[0,-1,0]]`，`k` 通常在 4.1–5.0
  Kernel { center: f32 },
  /// 反锐化掩模，`amount` 通常在 [0, 1]
  Unsharp { amount: f32 },
}

/// 一组增强参数：先做亮度/对比度映射，再锐化
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnhanceParams {
  pub brightness: f32,
  pub contrast: f32,
  pub sharpen: Sharpen,
}

impl Default for EnhanceParams {
  fn default() -> Self {
    Self {
      brightness: 0.0,
      contrast: 1.0,
      sharpen: Sharpen::None,
    }
  }
}

impl EnhanceParams {
  pub fn unsharp(amount: f32) -> Self {
    Self {
      sharpen: Sharpen::Unsharp { amount },
      ..Self::default()
    }
  }

  pub fn with_brightness_contrast(mut self, brightness: f32, contrast: f32) -> Self {
    self.brightness = brightness;
    self.contrast = contrast;
    self
  }

  fn has_tone_remap(&self) -> bool {
    self.brightness != 0.0 || self.contrast != 1.0
  }

  pub fn is_identity(&self) -> bool {
    !self.has_tone_remap() && matches!(self.sharpen, Sharpen::None)
  }

  pub fn apply(&self, frame: &RgbaFrame) -> RgbaFrame {
    let toned = if self.has_tone_remap() {
      brightness_contrast(frame, self.brightness, self.contrast)
    } else {
      frame.clone()
    };

    match self.sharpen {
      Sharpen::None => toned,
      Sharpen::Kernel { center } => sharpen(&toned, center),
      Sharpen::Unsharp { amount } => unsharp_mask(&toned, amount),
    }
  }
}

#[inline]
fn clamp_u8(v: f32) -> u8 {
  v.round().clamp(0.0, 255.0) as u8
}

/// 亮度/对比度映射：`v' = clamp01((v - 0.5) * contrast + 0.5 + brightness)`
pub fn brightness_contrast(frame: &RgbaFrame, brightness: f32, contrast: f32) -> RgbaFrame {
  let mut lut = [0u8; 256];
  for (i, entry) in lut.iter_mut().enumerate() {
    let v = i as f32 / 255.0;
    let mapped = ((v - 0.5) * contrast + 0.5 + brightness).clamp(0.0, 1.0);
    *entry = clamp_u8(mapped * 255.0);
  }

  let mut output = frame.clone();
  for px in output.as_mut().chunks_exact_mut(RGBA_CHANNELS) {
    for c in px.iter_mut().take(COLOR_CHANNELS) {
      *c = lut[*c as usize];
    }
  }
  output
}

/// 固定核锐化。首尾行列不参与卷积，原样复制。
pub fn sharpen(frame: &RgbaFrame, center: f32) -> RgbaFrame {
  let (width, height) = (frame.width(), frame.height());
  let mut output = frame.clone();
  if width < 3 || height < 3 {
    return output;
  }

  let src = frame.as_bytes();
  let dst = output.as_mut();
  let stride = width * RGBA_CHANNELS;

  for y in 1..height - 1 {
    for x in 1..width - 1 {
      let i = y * stride + x * RGBA_CHANNELS;
      for c in 0..COLOR_CHANNELS {
        let v = center * src[i + c] as f32
          - src[i + c - stride] as f32
          - src[i + c + stride] as f32
          - src[i + c - RGBA_CHANNELS] as f32
          - src[i + c + RGBA_CHANNELS] as f32;
        dst[i + c] = clamp_u8(v);
      }
    }
  }

  output
}

/// 3×3 均值模糊，边界像素保持原值
pub fn box_blur(frame: &RgbaFrame) -> RgbaFrame {
  let (width, height) = (frame.width(), frame.height());
  let mut output = frame.clone();
  if width < 3 || height < 3 {
    return output;
  }

  let src = frame.as_bytes();
  let dst = output.as_mut();
  let stride = width * RGBA_CHANNELS;

  for y in 1..height - 1 {
    for x in 1..width - 1 {
      let i = y * stride + x * RGBA_CHANNELS;
      for c in 0..COLOR_CHANNELS {
        dst[i + c] = clamp_u8(box_mean(src, i + c, stride));
      }
    }
  }

  output
}

/// `index` 处通道的 3×3 邻域均值，调用方保证邻域不越界
fn box_mean(src: &[u8], index: usize, stride: usize) -> f32 {
  let mut sum = 0u32;
  for row in [index - stride, index, index + stride] {
    sum += src[row - RGBA_CHANNELS] as u32;
    sum += src[row] as u32;
    sum += src[row + RGBA_CHANNELS] as u32;
  }
  sum as f32 / 9.0
}

/// 反锐化掩模：`out = orig + amount * (orig - blur)`
///
/// 均值以浮点参与运算，只在最后取整一次；边界像素的均值取其自身，因此保持原值。
pub fn unsharp_mask(frame: &RgbaFrame, amount: f32) -> RgbaFrame {
  let (width, height) = (frame.width(), frame.height());
  let mut output = frame.clone();
  if amount == 0.0 || width < 3 || height < 3 {
    return output;
  }

  let src = frame.as_bytes();
  let dst = output.as_mut();
  let stride = width * RGBA_CHANNELS;

  for y in 1..height - 1 {
    for x in 1..width - 1 {
      let i = y * stride + x * RGBA_CHANNELS;
      for c in 0..COLOR_CHANNELS {
        let orig = src[i + c] as f32;
        let blur = box_mean(src, i + c, stride);
        dst[i + c] = clamp_u8(orig + amount * (orig - blur));
      }
    }
  }

  output
}

/// 外部图像复原能力（去模糊、超分等），异步返回增强后的图像。
///
/// 输出尺寸可以与输入不同。
pub trait ExternalEnhancer {
  type Error: std::error::Error + Send + Sync + 'static;

  fn enhance(&self, image: RgbaFrame)
  -> impl Future<Output = Result<RgbaFrame, Self::Error>>;
}

/// 以 Lanczos3 放大图像，作为外部增强器的简单替代
#[derive(Debug, Clone, Copy)]
pub struct ResizeEnhancer {
  scale: u32,
}

impl ResizeEnhancer {
  pub fn new(scale: u32) -> Self {
    Self {
      scale: scale.max(1),
    }
  }
}

impl ExternalEnhancer for ResizeEnhancer {
  type Error = Infallible;

  async fn enhance(&self, image: RgbaFrame) -> Result<RgbaFrame, Self::Error> {
    if self.scale == 1 {
      return Ok(image);
    }
    let source = image.to_rgba_image();
    let (w, h) = source.dimensions();
    let resized = imageops::resize(&source, w * self.scale, h * self.scale, FilterType::Lanczos3);
    debug!("外部增强: {}x{} -> {}x{}", w, h, resized.width(), resized.height());
    Ok(RgbaFrame::from(resized))
  }
}
