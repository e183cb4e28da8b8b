use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use uuid::Uuid;

use crate::database::error::Error;

/// Image payload as accepted on the wire: either an opaque binary upload
/// with a declared extension, or a self-contained
/// `data:image/<ext>;base64,<payload>` URI.
#[derive(Debug, Clone)]
pub enum ImageInput {
    Raw { extension: String, bytes: Vec<u8> },
    DataUri(String),
}

/// Decoded image ready for the blob store, addressed by a generated name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImageBlob {
    pub fn from_input(input: ImageInput) -> Result<Self, Error> {
        let (extension, bytes) = match input {
            ImageInput::Raw { extension, bytes } => (extension, bytes),
            ImageInput::DataUri(uri) => decode_data_uri(&uri)?,
        };

        if bytes.is_empty() {
            return Err(Error::validation("Image payload is empty"));
        }

        Ok(Self {
            file_name: format!("{}.{}", Uuid::new_v4(), extension),
            bytes,
        })
    }
}

/// Splits `data:image/<ext>;base64,<payload>` and decodes the payload. The
/// extension is taken from the declared media subtype.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), Error> {
    let rest = uri
        .strip_prefix("data:image/")
        .ok_or_else(|| Error::validation("Image must be a data:image/... URI"))?;

    let (extension, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| Error::validation("Image data URI must be base64 encoded"))?;

    if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::validation("Invalid image media subtype"));
    }

    let bytes = STANDARD
        .decode(payload)
        .map_err(|_| Error::validation("Image payload is not valid base64"))?;

    Ok((extension.to_string(), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_decodes_to_declared_extension() {
        let (ext, bytes) = decode_data_uri("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(ext, "png");
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn non_image_uri_is_rejected() {
        assert!(decode_data_uri("data:text/plain;base64,aGVsbG8=").is_err());
        assert!(decode_data_uri("hello").is_err());
    }

    #[test]
    fn missing_base64_marker_is_rejected() {
        assert!(decode_data_uri("data:image/png,plain").is_err());
    }

    #[test]
    fn garbage_payload_is_rejected() {
        assert!(decode_data_uri("data:image/png;base64,?!?!").is_err());
    }

    #[test]
    fn blob_names_carry_the_extension() {
        let blob = ImageBlob::from_input(ImageInput::DataUri(String::from(
            "data:image/jpeg;base64,aGVsbG8=",
        )))
        .unwrap();
        assert!(blob.file_name.ends_with(".jpeg"));
        assert_eq!(blob.bytes, b"hello");
    }

    #[test]
    fn raw_uploads_pass_through() {
        let blob = ImageBlob::from_input(ImageInput::Raw {
            extension: String::from("png"),
            bytes: vec![1, 2, 3],
        })
        .unwrap();
        assert!(blob.file_name.ends_with(".png"));
        assert_eq!(blob.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn empty_payload_is_rejected() {
        let result = ImageBlob::from_input(ImageInput::Raw {
            extension: String::from("png"),
            bytes: vec![],
        });
        assert!(result.is_err());
    }
}
