use meshbus_frame::{decode, tag_name, Frame};
use serde::Serialize;

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{payload_preview, print, OutputFormat, Render};

#[derive(Debug, Serialize)]
struct DecodedFrame {
    tag: u8,
    tag_name: &'static str,
    payload_size: u64,
    payload: String,
}

impl From<&Frame> for DecodedFrame {
    fn from(frame: &Frame) -> Self {
        Self {
            tag: frame.tag,
            tag_name: tag_name(frame.tag),
            payload_size: frame.payload_len(),
            payload: payload_preview(&frame.payload),
        }
    }
}

impl Render for DecodedFrame {
    fn header(&self) -> Vec<&'static str> {
        vec!["TAG", "NAME", "SIZE", "PAYLOAD"]
    }

    fn rows(&self) -> Vec<Vec<String>> {
        vec![vec![
            self.tag.to_string(),
            self.tag_name.to_string(),
            self.payload_size.to_string(),
            self.payload.clone(),
        ]]
    }

    fn pretty(&self) -> String {
        format!(
            "tag={} ({}) size={} payload={}",
            self.tag, self.tag_name, self.payload_size, self.payload
        )
    }
}

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = parse_hex(&args.hex)?;
    let frame = decode(&bytes).map_err(|err| frame_error("invalid frame", err))?;
    print(&DecodedFrame::from(&frame), format);
    Ok(SUCCESS)
}

fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let compact = compact
        .strip_prefix("0x")
        .or_else(|| compact.strip_prefix("0X"))
        .unwrap_or(&compact);
    hex::decode(compact).map_err(|err| CliError::new(DATA_INVALID, format!("invalid hex: {err}")))
}
