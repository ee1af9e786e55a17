//! Request parameter parsing.
//!
//! A [`ParserChain`] turns a [`RawRequest`] into a [`Params`] store. Each
//! [`Parser`] owns a disjoint set of query keys and writes only its own store
//! keys, so the order of the chain matters for one thing only: which error a
//! request with several problems reports first. The source parser runs first,
//! so a request without a usable source is always rejected as such.
//!
//! Parsers store values in canonical form (lowercase names, normalized angles,
//! `0` sizes dropped) so that requests meaning the same thing produce the same
//! store, and therefore the same cache key.

use crate::error::ServerError;
use crate::imaging::{Background, CropSpec, Interpolation, Quality, Resampling, ResizeMode};
use crate::imaging::calculations::normalize_degrees;
use crate::params::Params;
use crate::source::sanitize_source;
use crate::types::Format;

/// The parts of an HTTP request the parsers look at.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    /// URL path with the routing prefix and leading slash removed.
    pub path: String,
    /// Decoded query pairs, in request order.
    pub query: Vec<(String, String)>,
}

impl RawRequest {
    pub fn new(path: impl Into<String>, query: Option<&str>) -> Self {
        let query = query
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        Self {
            path: path.into(),
            query,
        }
    }

    /// First non-empty value for `key`. Empty values count as absent.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.as_str())
    }
}

/// One link of the parser chain.
pub trait Parser: Send + Sync {
    fn parse(&self, request: &RawRequest, params: &mut Params) -> Result<(), ServerError>;
}

/// `source` query parameter, or the URL path when absent.
pub struct SourceParser;

impl Parser for SourceParser {
    fn parse(&self, request: &RawRequest, params: &mut Params) -> Result<(), ServerError> {
        let raw = request.query("source").unwrap_or(&request.path);
        if raw.is_empty() {
            return Err(ServerError::MissingParameter("source".into()));
        }
        params.insert("source", sanitize_source(raw)?)?;
        Ok(())
    }
}

/// `crop`, with `crop_anchor` folded in for `WxH` windows.
pub struct CropParser;

impl Parser for CropParser {
    fn parse(&self, request: &RawRequest, params: &mut Params) -> Result<(), ServerError> {
        let anchor = request.query("crop_anchor");
        let Some(crop) = request.query("crop") else {
            if anchor.is_some() {
                return Err(ServerError::invalid("crop_anchor", "requires crop"));
            }
            return Ok(());
        };

        let text = match anchor {
            Some(anchor) if crop.contains('|') || crop.contains('@') => {
                return Err(ServerError::invalid(
                    "crop_anchor",
                    format!("'{anchor}' only applies to a plain WxH crop"),
                ));
            }
            Some(anchor) => format!("{crop}@{anchor}"),
            None => crop.to_string(),
        };
        let spec: CropSpec = text.parse().map_err(|e| ServerError::invalid("crop", e))?;
        params.insert("crop", spec.to_string())?;
        Ok(())
    }
}

/// `angle`, `background` and `interpolation`.
pub struct RotateParser;

impl Parser for RotateParser {
    fn parse(&self, request: &RawRequest, params: &mut Params) -> Result<(), ServerError> {
        if let Some(angle) = request.query("angle") {
            let degrees: f64 = angle
                .trim()
                .parse()
                .ok()
                .filter(|d: &f64| d.is_finite())
                .ok_or_else(|| ServerError::invalid("angle", format!("'{angle}' is not a number")))?;
            let degrees = normalize_degrees(degrees);
            if degrees != 0.0 {
                params.insert("angle", degrees)?;
            }
        }
        if let Some(background) = request.query("background") {
            let color: Background = background
                .parse()
                .map_err(|e| ServerError::invalid("background", e))?;
            params.insert("background", color.to_string())?;
        }
        if let Some(interpolation) = request.query("interpolation") {
            let interpolation: Interpolation = interpolation
                .parse()
                .map_err(|e| ServerError::invalid("interpolation", e))?;
            params.insert("interpolation", interpolation.name())?;
        }
        Ok(())
    }
}

/// `width`, `height`, `mode` and `resampling`.
pub struct ResizeParser;

impl ResizeParser {
    fn dimension(request: &RawRequest, key: &str, params: &mut Params) -> Result<(), ServerError> {
        let Some(value) = request.query(key) else {
            return Ok(());
        };
        let pixels: u32 = value.trim().parse().map_err(|_| {
            ServerError::invalid(key, format!("'{value}' is not a non-negative integer"))
        })?;
        if pixels > 0 {
            params.insert(key, i64::from(pixels))?;
        }
        Ok(())
    }
}

impl Parser for ResizeParser {
    fn parse(&self, request: &RawRequest, params: &mut Params) -> Result<(), ServerError> {
        Self::dimension(request, "width", params)?;
        Self::dimension(request, "height", params)?;
        if let Some(mode) = request.query("mode") {
            let mode: ResizeMode = mode.parse().map_err(|e| ServerError::invalid("mode", e))?;
            // Exact is the default; storing it would split the cache
            if mode != ResizeMode::Exact {
                params.insert("mode", mode.name())?;
            }
        }
        if let Some(resampling) = request.query("resampling") {
            let resampling: Resampling = resampling
                .parse()
                .map_err(|e| ServerError::invalid("resampling", e))?;
            params.insert("resampling", resampling.name())?;
        }
        Ok(())
    }
}

/// `format`: the output encoding.
pub struct FormatParser;

impl Parser for FormatParser {
    fn parse(&self, request: &RawRequest, params: &mut Params) -> Result<(), ServerError> {
        if let Some(format) = request.query("format") {
            let format: Format = format.parse().map_err(|e| ServerError::invalid("format", e))?;
            params.insert("format", format.name())?;
        }
        Ok(())
    }
}

/// `quality`: lossy encoding quality, 1-100.
pub struct QualityParser;

impl Parser for QualityParser {
    fn parse(&self, request: &RawRequest, params: &mut Params) -> Result<(), ServerError> {
        if let Some(quality) = request.query("quality") {
            let value = quality
                .trim()
                .parse::<i64>()
                .ok()
                .and_then(Quality::try_from_i64)
                .ok_or_else(|| {
                    ServerError::invalid(
                        "quality",
                        format!("'{quality}' is not an integer between 1 and 100"),
                    )
                })?;
            params.insert("quality", i64::from(value.value()))?;
        }
        Ok(())
    }
}

/// `gamma`: per-request override of gamma-correct processing.
pub struct GammaParser;

impl Parser for GammaParser {
    fn parse(&self, request: &RawRequest, params: &mut Params) -> Result<(), ServerError> {
        if let Some(gamma) = request.query("gamma") {
            let enabled = match gamma.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => true,
                "false" | "0" | "no" | "off" => false,
                _ => {
                    return Err(ServerError::invalid(
                        "gamma",
                        format!("'{gamma}' is not a boolean"),
                    ));
                }
            };
            params.insert("gamma", enabled)?;
        }
        Ok(())
    }
}

/// Ordered list of parsers. See the [module docs](self).
pub struct ParserChain {
    parsers: Vec<Box<dyn Parser>>,
}

impl ParserChain {
    pub fn new(parsers: Vec<Box<dyn Parser>>) -> Self {
        Self { parsers }
    }

    /// Run every parser in order, stopping at the first failure.
    pub fn parse(&self, request: &RawRequest) -> Result<Params, ServerError> {
        let mut params = Params::new();
        for parser in &self.parsers {
            parser.parse(request, &mut params)?;
        }
        Ok(params)
    }
}

impl Default for ParserChain {
    fn default() -> Self {
        Self::new(vec![
            Box::new(SourceParser),
            Box::new(CropParser),
            Box::new(RotateParser),
            Box::new(ResizeParser),
            Box::new(FormatParser),
            Box::new(QualityParser),
            Box::new(GammaParser),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(path: &str, query: &str) -> Result<Params, ServerError> {
        ParserChain::default().parse(&RawRequest::new(path, Some(query)))
    }

    fn invalid_param(err: ServerError) -> String {
        match err {
            ServerError::InvalidValue { param, .. } => param,
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn query_decodes_and_skips_empty_values() {
        let req = RawRequest::new("", Some("source=a%20b.jpg&width=&width=10"));
        assert_eq!(req.query("source"), Some("a b.jpg"));
        assert_eq!(req.query("width"), Some("10"));
        assert_eq!(req.query("height"), None);
    }

    #[test]
    fn source_from_query_wins_over_path() {
        let params = parse("ignored.png", "source=photo.jpg").unwrap();
        assert_eq!(params.get_str("source").unwrap(), "photo.jpg");
    }

    #[test]
    fn source_from_path() {
        let params = parse("albums/./cats/tom.gif", "").unwrap();
        assert_eq!(params.get_str("source").unwrap(), "albums/cats/tom.gif");
    }

    #[test]
    fn missing_source_is_reported() {
        assert_eq!(
            parse("", "width=10").unwrap_err(),
            ServerError::MissingParameter("source".into())
        );
    }

    #[test]
    fn traversal_is_bad_source() {
        assert!(matches!(
            parse("", "source=../secret.jpg").unwrap_err(),
            ServerError::BadSource(_)
        ));
    }

    #[test]
    fn source_errors_take_precedence() {
        // Both source and width are wrong; source is checked first
        assert_eq!(
            parse("", "width=abc").unwrap_err(),
            ServerError::MissingParameter("source".into())
        );
    }

    #[test]
    fn full_request_populates_every_key() {
        let params = parse(
            "",
            "source=a.jpg&crop=100x50&crop_anchor=top&angle=-90&background=FF0000\
             &interpolation=bilinear&width=200&height=100&mode=fit&resampling=lanczos3\
             &format=jpg&quality=75&gamma=off",
        )
        .unwrap();
        assert_eq!(params.get_str("crop").unwrap(), "100x50@top");
        assert_eq!(params.get_float("angle").unwrap(), 270.0);
        assert_eq!(params.get_str("background").unwrap(), "ff0000ff");
        assert_eq!(params.get_str("interpolation").unwrap(), "linear");
        assert_eq!(params.get_int("width").unwrap(), 200);
        assert_eq!(params.get_int("height").unwrap(), 100);
        assert_eq!(params.get_str("mode").unwrap(), "fit");
        assert_eq!(params.get_str("resampling").unwrap(), "lanczos");
        assert_eq!(params.get_str("format").unwrap(), "jpeg");
        assert_eq!(params.get_int("quality").unwrap(), 75);
        assert!(!params.get_bool("gamma").unwrap());
    }

    #[test]
    fn neutral_values_are_dropped() {
        let params = parse("", "source=a.jpg&angle=360&width=0&mode=exact").unwrap();
        assert_eq!(params.keys().collect::<Vec<_>>(), vec!["source"]);
    }

    #[test]
    fn query_order_does_not_change_the_store() {
        let a = parse("", "source=a.jpg&width=100&quality=80").unwrap();
        let b = parse("", "quality=80&width=100&source=a.jpg").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.canonical_bytes(), b.canonical_bytes());
    }

    #[test]
    fn crop_rectangle_is_canonicalized() {
        let params = parse("", "source=a.jpg&crop=%2010,20%7C30,40").unwrap();
        assert_eq!(params.get_str("crop").unwrap(), "10,20|30,40");
    }

    #[test]
    fn crop_anchor_without_crop_is_invalid() {
        let err = parse("", "source=a.jpg&crop_anchor=top").unwrap_err();
        assert_eq!(invalid_param(err), "crop_anchor");
    }

    #[test]
    fn crop_anchor_conflicts_with_rectangle() {
        let err = parse("", "source=a.jpg&crop=0,0%7C5,5&crop_anchor=top").unwrap_err();
        assert_eq!(invalid_param(err), "crop_anchor");
    }

    #[test]
    fn invalid_values_name_their_parameter() {
        for (query, param) in [
            ("crop=nope", "crop"),
            ("angle=NaN", "angle"),
            ("angle=ninety", "angle"),
            ("background=red", "background"),
            ("interpolation=smooth", "interpolation"),
            ("width=-5", "width"),
            ("height=1.5", "height"),
            ("mode=stretch", "mode"),
            ("resampling=magic", "resampling"),
            ("format=webp", "format"),
            ("quality=0", "quality"),
            ("quality=101", "quality"),
            ("gamma=maybe", "gamma"),
        ] {
            let err = parse("", &format!("source=a.jpg&{query}")).unwrap_err();
            assert_eq!(invalid_param(err), param, "query {query}");
        }
    }

    #[test]
    fn custom_chain_runs_in_order() {
        let chain = ParserChain::new(vec![Box::new(ResizeParser), Box::new(SourceParser)]);
        // Resize runs first now, so its error wins
        let err = chain
            .parse(&RawRequest::new("", Some("width=abc")))
            .unwrap_err();
        assert_eq!(invalid_param(err), "width");
    }
}
