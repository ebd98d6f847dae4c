use std::fs;

use meshbus_frame::{encode, tag_name};
use serde::Serialize;

use crate::cmd::EncodeArgs;
use crate::exit::{io_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print, OutputFormat, Render};

#[derive(Debug, Serialize)]
struct EncodedFrame {
    tag: u8,
    tag_name: &'static str,
    payload_size: usize,
    frame_size: usize,
    hex: String,
}

impl Render for EncodedFrame {
    fn header(&self) -> Vec<&'static str> {
        vec!["TAG", "NAME", "PAYLOAD", "FRAME", "HEX"]
    }

    fn rows(&self) -> Vec<Vec<String>> {
        vec![vec![
            self.tag.to_string(),
            self.tag_name.to_string(),
            self.payload_size.to_string(),
            self.frame_size.to_string(),
            self.hex.clone(),
        ]]
    }

    fn pretty(&self) -> String {
        self.hex.clone()
    }
}

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    let frame = encode(&payload, args.tag);

    print(
        &EncodedFrame {
            tag: args.tag,
            tag_name: tag_name(args.tag),
            payload_size: payload.len(),
            frame_size: frame.len(),
            hex: hex::encode(&frame),
        },
        format,
    );
    Ok(SUCCESS)
}

fn resolve_payload(args: &EncodeArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}
