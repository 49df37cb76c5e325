//! Device and browser fingerprinting from user-agent strings.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{Error, Result};

/// Viewports narrower than this are treated as phones when there is no
/// user agent to go on.
const MOBILE_MAX_WIDTH: u64 = 768;
const TABLET_MAX_WIDTH: u64 = 1024;

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceType {
  #[default]
  Desktop,
  Mobile,
  Tablet,
}

impl DeviceType {
  pub fn as_str(self) -> &'static str { self.into() }

  pub fn parse(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownDeviceType(s.to_owned()))
  }

  /// Classify a visitor. The user agent wins; the viewport width is only
  /// consulted when the user agent is absent.
  pub fn detect(user_agent: Option<&str>, viewport_width: Option<u64>) -> Self {
    if let Some(ua) = user_agent.filter(|ua| !ua.trim().is_empty()) {
      let ua = ua.to_ascii_lowercase();
      if ua.contains("ipad")
        || ua.contains("tablet")
        || (ua.contains("android") && !ua.contains("mobile"))
      {
        return Self::Tablet;
      }
      if ua.contains("mobi")
        || ua.contains("iphone")
        || ua.contains("ipod")
        || ua.contains("android")
      {
        return Self::Mobile;
      }
      return Self::Desktop;
    }

    match viewport_width {
      Some(w) if w < MOBILE_MAX_WIDTH => Self::Mobile,
      Some(w) if w < TABLET_MAX_WIDTH => Self::Tablet,
      _ => Self::Desktop,
    }
  }
}

/// Best-effort browser family. Order matters: Edge and Opera both announce
/// themselves as Chrome, and Chrome announces itself as Safari.
pub fn browser_name(user_agent: Option<&str>) -> &'static str {
  let Some(ua) = user_agent else { return "Other" };
  let ua = ua.to_ascii_lowercase();
  if ua.contains("edg/") || ua.contains("edge/") {
    "Edge"
  } else if ua.contains("opr/") || ua.contains("opera") {
    "Opera"
  } else if ua.contains("chrome/") || ua.contains("crios/") {
    "Chrome"
  } else if ua.contains("firefox/") || ua.contains("fxios/") {
    "Firefox"
  } else if ua.contains("safari/") {
    "Safari"
  } else {
    "Other"
  }
}

/// Pull a width out of the loosely-typed `viewport` field. Clients send
/// either `{"width": 390, "height": 844}` or `"390x844"`.
pub fn viewport_width(viewport: &serde_json::Value) -> Option<u64> {
  match viewport {
    serde_json::Value::Object(map) => {
      map.get("width").and_then(serde_json::Value::as_f64).map(|w| w as u64)
    }
    serde_json::Value::String(s) => {
      s.split(['x', 'X']).next().and_then(|w| w.trim().parse().ok())
    }
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
    AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
  const IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 16_6 like Mac OS X) \
    AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1";
  const ANDROID_TABLET: &str = "Mozilla/5.0 (Linux; Android 13; SM-X700) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
  const EDGE: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";
  const FIREFOX: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";

  #[test]
  fn classifies_devices() {
    assert_eq!(DeviceType::detect(Some(IPHONE), None), DeviceType::Mobile);
    assert_eq!(DeviceType::detect(Some(IPAD), None), DeviceType::Tablet);
    assert_eq!(DeviceType::detect(Some(ANDROID_TABLET), None), DeviceType::Tablet);
    assert_eq!(DeviceType::detect(Some(EDGE), Some(300)), DeviceType::Desktop);
  }

  #[test]
  fn viewport_is_a_fallback() {
    assert_eq!(DeviceType::detect(None, Some(390)), DeviceType::Mobile);
    assert_eq!(DeviceType::detect(Some(""), Some(800)), DeviceType::Tablet);
    assert_eq!(DeviceType::detect(None, None), DeviceType::Desktop);
  }

  #[test]
  fn names_browsers() {
    assert_eq!(browser_name(Some(EDGE)), "Edge");
    assert_eq!(browser_name(Some(ANDROID_TABLET)), "Chrome");
    assert_eq!(browser_name(Some(IPHONE)), "Safari");
    assert_eq!(browser_name(Some(FIREFOX)), "Firefox");
    assert_eq!(browser_name(None), "Other");
  }

  #[test]
  fn parses_viewport_shapes() {
    assert_eq!(
      viewport_width(&serde_json::json!({ "width": 390, "height": 844 })),
      Some(390)
    );
    assert_eq!(viewport_width(&serde_json::json!("1280x720")), Some(1280));
    assert_eq!(viewport_width(&serde_json::json!(true)), None);
  }
}
