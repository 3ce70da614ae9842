// src/qr.rs
use std::fmt;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, RgbImage};
use qrcode::{EcLevel, QrCode};
use serde::{Deserialize, Serialize};

use crate::config::QrConfig;
use crate::error::ApiError;

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Тело запроса от фронтенда. Числа могут прийти строками из `<input>`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub size: Option<LooseInt>,
    #[serde(default)]
    pub margin: Option<LooseInt>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub ec_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LooseInt {
    Number(f64),
    Text(String),
}

impl LooseInt {
    /// Как `parseInt`: ведущие пробелы, знак, цифры; остальное отбрасывается
    pub fn to_int(&self) -> Option<i64> {
        match self {
            LooseInt::Number(n) if n.is_finite() => Some(n.trunc() as i64),
            LooseInt::Number(_) => None,
            LooseInt::Text(s) => {
                let s = s.trim_start();
                let (sign, rest) = match s.strip_prefix('-') {
                    Some(rest) => (-1, rest),
                    None => (1, s.strip_prefix('+').unwrap_or(s)),
                };
                let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse::<i64>().ok().map(|n| sign * n)
            }
        }
    }
}

impl QrRequest {
    /// Текст для кодирования; пустой или из одних пробелов отклоняется
    pub fn text(&self) -> Result<&str, ApiError> {
        match self.text.as_deref() {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(ApiError::EmptyText),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EcLevelName {
    L,
    M,
    Q,
    H,
}

impl FromStr for EcLevelName {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L" => Ok(EcLevelName::L),
            "M" => Ok(EcLevelName::M),
            "Q" => Ok(EcLevelName::Q),
            "H" => Ok(EcLevelName::H),
            _ => Err(ApiError::InvalidEcLevel(s.to_string())),
        }
    }
}

impl fmt::Display for LooseInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LooseInt::Number(n) => write!(f, "{}", n),
            LooseInt::Text(s) => f.write_str(s),
        }
    }
}

impl fmt::Display for EcLevelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EcLevelName::L => "L",
            EcLevelName::M => "M",
            EcLevelName::Q => "Q",
            EcLevelName::H => "H",
        };
        f.write_str(name)
    }
}

impl From<EcLevelName> for EcLevel {
    fn from(level: EcLevelName) -> Self {
        match level {
            EcLevelName::L => EcLevel::L,
            EcLevelName::M => EcLevel::M,
            EcLevelName::Q => EcLevel::Q,
            EcLevelName::H => EcLevel::H,
        }
    }
}

/// Разобрать `#RRGGBB` или `#RGB`
pub fn parse_hex_color(raw: &str) -> Result<Rgb<u8>, ApiError> {
    let invalid = || ApiError::InvalidColor(raw.to_string());

    let hex = raw.trim().strip_prefix('#').ok_or_else(invalid)?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let expanded: String = match hex.len() {
        6 => hex.to_string(),
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        _ => return Err(invalid()),
    };

    let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).map_err(|_| invalid());
    Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

/// Проверенные параметры отрисовки
#[derive(Debug, Clone, PartialEq)]
pub struct QrOptions {
    /// Сторона итоговой картинки в пикселях
    pub size: u32,
    /// Тихая зона в модулях
    pub margin: u32,
    pub dark: Rgb<u8>,
    pub light: Rgb<u8>,
    pub ec_level: EcLevelName,
}

#[derive(Debug, Clone)]
pub struct QrService {
    config: QrConfig,
}

impl QrService {
    pub fn new(config: QrConfig) -> Self {
        Self { config }
    }

    /// Собрать параметры из запроса, подставив дефолты и проверив границы
    pub fn options_for(&self, request: &QrRequest) -> Result<QrOptions, ApiError> {
        let cfg = &self.config;

        let size = match &request.size {
            Some(raw) => {
                let value = raw
                    .to_int()
                    .ok_or_else(|| ApiError::SizeNotANumber(raw.to_string()))?;
                if value < cfg.min_size as i64 || value > cfg.max_size as i64 {
                    return Err(ApiError::InvalidSize {
                        size: value,
                        min: cfg.min_size,
                        max: cfg.max_size,
                    });
                }
                value as u32
            }
            None => cfg.default_size,
        };

        let margin = match &request.margin {
            Some(raw) => {
                let value = raw
                    .to_int()
                    .ok_or_else(|| ApiError::MarginNotANumber(raw.to_string()))?;
                if value < 0 || value > cfg.max_margin as i64 {
                    return Err(ApiError::InvalidMargin {
                        margin: value,
                        max: cfg.max_margin,
                    });
                }
                value as u32
            }
            None => cfg.default_margin,
        };

        let dark = parse_hex_color(request.color.as_deref().unwrap_or("#000000"))?;
        let light = parse_hex_color(request.background_color.as_deref().unwrap_or("#FFFFFF"))?;

        let ec_level = match &request.ec_level {
            Some(raw) => raw.parse()?,
            None => cfg.ec_level,
        };

        Ok(QrOptions {
            size,
            margin,
            dark,
            light,
            ec_level,
        })
    }

    /// Отрисовать QR код в RGB буфер ровно `size x size`
    pub fn render_image(&self, data: &str, options: &QrOptions) -> Result<RgbImage, ApiError> {
        // Создаем QR код
        let code = QrCode::with_error_correction_level(data.as_bytes(), options.ec_level.into())?;

        let width = code.width() as u32;
        let border = options.margin;
        let modules = width + 2 * border;

        // Меньше пикселя на модуль: ресайз выбросит модули и код не прочитается
        if modules > options.size {
            return Err(ApiError::SizeTooSmall {
                size: options.size,
                needed: modules,
            });
        }

        // Целый масштаб модуля, добиваем до точного размера ниже
        let scale = options.size / modules;
        let img_size = modules * scale;

        // Заполняем фоном
        let mut img: RgbImage = ImageBuffer::from_pixel(img_size, img_size, options.light);

        // Рисуем QR код
        for y in 0..width {
            for x in 0..width {
                if code[(x as usize, y as usize)] == qrcode::Color::Dark {
                    for dy in 0..scale {
                        for dx in 0..scale {
                            let px = (border + x) * scale + dx;
                            let py = (border + y) * scale + dy;
                            img.put_pixel(px, py, options.dark);
                        }
                    }
                }
            }
        }

        if img_size == options.size {
            Ok(img)
        } else {
            Ok(imageops::resize(&img, options.size, options.size, FilterType::Nearest))
        }
    }

    /// Сгенерировать PNG байты
    pub fn render_png(&self, data: &str, options: &QrOptions) -> Result<Vec<u8>, ApiError> {
        let img = self.render_image(data, options)?;

        // Конвертируем в PNG bytes
        let mut png_bytes = Vec::new();
        {
            use image::codecs::png::PngEncoder;
            use image::ImageEncoder;

            let encoder = PngEncoder::new(&mut png_bytes);
            encoder.write_image(
                img.as_raw(),
                img.width(),
                img.height(),
                image::ColorType::Rgb8,
            )?;
        }

        Ok(png_bytes)
    }

}

/// PNG в base64 data URL
pub fn to_data_url(png_bytes: &[u8]) -> String {
    // Кодируем в base64
    let base64_string = general_purpose::STANDARD.encode(png_bytes);
    format!("{}{}", DATA_URL_PREFIX, base64_string)
}
