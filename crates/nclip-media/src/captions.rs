//! ASS subtitle documents for burned-in captions.

use nclip_models::timestamp::format_ass_time;
use nclip_models::{CaptionCue, OutputFormat};

/// Visual style of the caption layer.
#[derive(Debug, Clone)]
pub struct CaptionStyle {
    pub font_name: String,
    pub font_size: u32,
    /// `&HAABBGGRR` fill colour
    pub primary_colour: String,
    /// `&HAABBGGRR` outline colour
    pub outline_colour: String,
    pub outline_width: u32,
    /// Distance of the caption baseline from the bottom edge
    pub margin_bottom: u32,
    pub uppercase: bool,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_name: "Arial".to_string(),
            font_size: 72,
            primary_colour: "&H0000FFFF".to_string(),
            outline_colour: "&H00000000".to_string(),
            outline_width: 4,
            margin_bottom: 400,
            uppercase: true,
        }
    }
}

/// Build a complete ASS document for `cues` (timeline-absolute seconds).
pub fn build_ass_document(cues: &[CaptionCue], format: &OutputFormat, style: &CaptionStyle) -> String {
    let mut doc = format!(
        r#"[Script Info]
ScriptType: v4.00+
PlayResX: {w}
PlayResY: {h}
WrapStyle: 0
ScaledBorderAndShadow: yes

[V4+ Styles]
Format: Name,Fontname,Fontsize,PrimaryColour,SecondaryColour,OutlineColour,BackColour,Bold,Italic,Underline,StrikeOut,ScaleX,ScaleY,Spacing,Angle,BorderStyle,Outline,Shadow,Alignment,MarginL,MarginR,MarginV,Encoding
Style: Caption,{font},{size},{pri},{pri},{out},&H00000000,-1,0,0,0,100,100,0,0,1,{ow},0,2,60,60,{mv},1

[Events]
Format: Layer,Start,End,Style,Name,MarginL,MarginR,MarginV,Effect,Text
"#,
        w = format.width,
        h = format.height,
        font = style.font_name,
        size = style.font_size,
        pri = style.primary_colour,
        out = style.outline_colour,
        ow = style.outline_width,
        mv = style.margin_bottom,
    );

    for cue in cues {
        let text = if style.uppercase {
            cue.text.to_uppercase()
        } else {
            cue.text.clone()
        };
        doc.push_str(&format!(
            "Dialogue: 0,{},{},Caption,,0,0,0,,{}\n",
            format_ass_time(cue.start),
            format_ass_time(cue.end),
            escape_ass_text(&text)
        ));
    }

    doc
}

/// Neutralise override blocks and line breaks in caption text.
fn escape_ass_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('{', "\\{")
        .replace('}', "\\}")
        .replace(['\r', '\n'], " ")
}
