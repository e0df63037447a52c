//! Payloads built while staging an input: its creation settings and the
//! base transform of its scene item.

use scenesched_shared::{Program, Settings};
use serde_json::json;
use url::Url;

use crate::remote::CanvasSize;

pub const KIND_FFMPEG: &str = "ffmpeg_source";
pub const KIND_VLC: &str = "vlc_source";
pub const KIND_BROWSER: &str = "browser_source";

/// Alignment value the remote tool uses for top-left.
const ALIGN_TOP_LEFT: i64 = 5;
const BOUNDS_STRETCH: &str = "OBS_BOUNDS_STRETCH";

/// Creation settings for `program`: the kind's defaults, then the URI placed
/// where the kind expects it, then the program's own settings on top.
pub fn input_settings(defaults: Settings, program: &Program) -> Settings {
    let mut settings = defaults;
    let uri = program.uri.as_str();

    match program.input_kind.as_str() {
        KIND_FFMPEG if is_remote_uri(uri) => {
            settings.insert("input", uri);
            settings.insert("is_local_file", false);
        }
        KIND_FFMPEG => {
            settings.insert("local_file", uri);
            settings.insert("is_local_file", true);
        }
        KIND_VLC => {
            settings.insert("playlist", json!([{ "value": uri }]));
        }
        KIND_BROWSER => {
            settings.insert("url", uri);
        }
        _ => {}
    }

    settings.apply_patch(&program.input_settings);
    settings
}

/// Transform that stretches an item over the whole canvas from the top-left
/// corner.
pub fn stretch_transform(canvas: CanvasSize) -> Settings {
    Settings::new()
        .with("boundsType", BOUNDS_STRETCH)
        .with("alignment", ALIGN_TOP_LEFT)
        .with("positionX", 0.0)
        .with("positionY", 0.0)
        .with("boundsWidth", f64::from(canvas.width))
        .with("boundsHeight", f64::from(canvas.height))
}

/// True for URIs that parse with a non-empty host; anything else is a local
/// path.
pub fn is_remote_uri(uri: &str) -> bool {
    Url::parse(uri).is_ok_and(|url| url.host_str().is_some_and(|host| !host.is_empty()))
}
