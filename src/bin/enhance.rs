// 该文件是 Jianma （鉴码） 项目的一部分。
// src/bin/enhance.rs - 对单张图像做确定性增强
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

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::info;
use url::Url;

use jianma::{
  FromUrl,
  enhance::{EnhanceParams, Sharpen},
  input::ImageFileInput,
};

/// 亮度/对比度与锐化
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像，如 image:///path/cdp.png
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出 PNG 文件路径
  #[arg(long, value_name = "FILE")]
  pub output: PathBuf,

  /// 亮度偏移，单位为满量程
  #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
  pub brightness: f32,

  #[arg(long, default_value_t = 1.0)]
  pub contrast: f32,

  /// 反锐化强度
  #[arg(long, value_name = "AMOUNT", conflicts_with = "kernel")]
  pub unsharp: Option<f32>,

  /// 3×3 锐化核中心权重，不带值时使用 5.0
  #[arg(long, value_name = "CENTER", num_args = 0..=1, default_missing_value = "5.0")]
  pub kernel: Option<f32>,
}

impl Args {
  fn params(&self) -> EnhanceParams {
    let sharpen = match (self.unsharp, self.kernel) {
      (Some(amount), _) => Sharpen::Unsharp { amount },
      (None, Some(center)) => Sharpen::Kernel { center },
      (None, None) => Sharpen::None,
    };
    EnhanceParams {
      sharpen,
      ..EnhanceParams::default()
    }
    .with_brightness_contrast(self.brightness, self.contrast)
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let params = args.params();
  info!("输入图像: {}", args.input);
  info!("增强参数: {:?}", params);

  let mut input = ImageFileInput::from_url(&args.input)?;
  let frame = input.next().ok_or_else(|| anyhow!("没有输入帧"))?;

  let enhanced = params.apply(&frame);
  enhanced.to_rgba_image().save(&args.output)?;
  info!("已保存增强结果: {}", args.output.display());

  Ok(())
}
