// 该文件是 Jianma （鉴码） 项目的一部分。
// src/main.rs - QR 采集主程序
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

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use jianma::{
  FromUrl,
  capture::CaptureSession,
  config::{
    CaptureConfig, DEFAULT_CENTER_FRACTION, DEFAULT_DECODE_MAX_DIMENSION,
    DEFAULT_FALLBACK_FRACTION, DEFAULT_PADDING_RATIO, ExtractStrategy,
  },
  detect::RqrrDecoder,
  enhance::{EnhanceParams, ResizeEnhancer, Sharpen},
  input::InputWrapper,
  output::OutputWrapper,
  stability::{DEFAULT_POSITION_TOL_PX, DEFAULT_SIZE_TOL_RATIO, DEFAULT_STABILITY_FRAMES},
  task::{ContinuousTask, Task},
};

/// Jianma 采集参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源，如 image:///path/a.png?repeat=8 或 folder:///path/frames
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，如 image:///path/prefix 或 folder:///path/records?annotate
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,

  /// 中心块边长相对 QR 裁剪短边的比例
  #[arg(long, default_value_t = DEFAULT_CENTER_FRACTION)]
  pub center_fraction: f64,

  /// 裁剪边距相对检测框长边的比例
  #[arg(long, default_value_t = DEFAULT_PADDING_RATIO)]
  pub padding_ratio: f64,

  /// 角点不足时，居中正方形边长相对帧短边的比例
  #[arg(long, default_value_t = DEFAULT_FALLBACK_FRACTION)]
  pub fallback_fraction: f64,

  #[arg(long, default_value_t = DEFAULT_STABILITY_FRAMES)]
  pub stability_frames: usize,

  /// 窗口内检测框中心相对均值的最大偏移（像素）
  #[arg(long, default_value_t = DEFAULT_POSITION_TOL_PX)]
  pub position_tol_px: f64,

  /// 窗口内检测框宽高相对均值的最大偏差比例
  #[arg(long, default_value_t = DEFAULT_SIZE_TOL_RATIO)]
  pub size_tol_ratio: f64,

  /// 关闭稳定性判定，首次解码成功即提交
  #[arg(long)]
  pub no_stability: bool,

  /// 使用透视校正，参数为输出正方形边长
  #[arg(long, value_name = "SIDE")]
  pub perspective: Option<u32>,

  /// 提交后的提取失败时回到扫描
  #[arg(long)]
  pub retry: bool,

  #[arg(long, default_value_t = DEFAULT_DECODE_MAX_DIMENSION)]
  pub decode_max_dimension: u32,

  /// QR 裁剪亮度偏移，单位为满量程
  #[arg(long, value_name = "OFFSET", allow_negative_numbers = true)]
  pub qr_brightness: Option<f32>,

  #[arg(long, value_name = "GAIN")]
  pub qr_contrast: Option<f32>,

  /// QR 裁剪反锐化强度
  #[arg(long, value_name = "AMOUNT", conflicts_with = "qr_kernel")]
  pub qr_sharpen: Option<f32>,

  /// QR 裁剪 3×3 锐化核中心权重，不带值时使用 5.0
  #[arg(long, value_name = "CENTER", num_args = 0..=1, default_missing_value = "5.0")]
  pub qr_kernel: Option<f32>,

  /// 中心块亮度偏移，单位为满量程
  #[arg(long, value_name = "OFFSET", allow_negative_numbers = true)]
  pub patch_brightness: Option<f32>,

  #[arg(long, value_name = "GAIN")]
  pub patch_contrast: Option<f32>,

  /// 中心块反锐化强度
  #[arg(long, value_name = "AMOUNT", visible_alias = "patch-sharpen")]
  pub sharpen: Option<f32>,

  /// 在采样中心块之前把 QR 裁剪放大指定倍数
  #[arg(long, value_name = "SCALE")]
  pub upscale: Option<u32>,
}

/// 三个选项都未给出时不做增强
fn enhance_params(
  brightness: Option<f32>,
  contrast: Option<f32>,
  sharpen: Sharpen,
) -> Option<EnhanceParams> {
  if brightness.is_none() && contrast.is_none() && matches!(sharpen, Sharpen::None) {
    return None;
  }
  let params = EnhanceParams {
    sharpen,
    ..EnhanceParams::default()
  };
  Some(params.with_brightness_contrast(brightness.unwrap_or(0.0), contrast.unwrap_or(1.0)))
}

impl Args {
  fn qr_sharpen(&self) -> Sharpen {
    match (self.qr_sharpen, self.qr_kernel) {
      (Some(amount), _) => Sharpen::Unsharp { amount },
      (None, Some(center)) => Sharpen::Kernel { center },
      (None, None) => Sharpen::None,
    }
  }

  fn capture_config(&self) -> CaptureConfig {
    let patch_sharpen = self
      .sharpen
      .map(|amount| Sharpen::Unsharp { amount })
      .unwrap_or_default();

    CaptureConfig {
      center_fraction: self.center_fraction,
      padding_ratio: self.padding_ratio,
      fallback_fraction: self.fallback_fraction,
      stability_enabled: !self.no_stability,
      stability_frames: self.stability_frames,
      position_tol_px: self.position_tol_px,
      size_tol_ratio: self.size_tol_ratio,
      strategy: self
        .perspective
        .map(|side| ExtractStrategy::Perspective { side })
        .unwrap_or_default(),
      qr_enhance: enhance_params(self.qr_brightness, self.qr_contrast, self.qr_sharpen()),
      patch_enhance: enhance_params(self.patch_brightness, self.patch_contrast, patch_sharpen),
      retry_on_failure: self.retry,
      decode_max_dimension: self.decode_max_dimension,
    }
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = args.capture_config();
  info!("采集配置: {:?}", config);

  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;
  let decoder = RqrrDecoder::with_max_dimension(config.decode_max_dimension);
  let session = CaptureSession::new(config, decoder)?;

  let captured = ContinuousTask::new()
    .with_frame_number(args.frame_number)
    .with_enhancer(args.upscale.map(ResizeEnhancer::new))
    .run_task(input, session, output)?;

  match captured {
    Some(artifacts) => info!("采集成功: {}", artifacts.text),
    None => warn!("没有完成采集"),
  }

  Ok(())
}
