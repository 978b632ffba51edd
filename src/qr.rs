//! Issues the QR codes students scan to check in.

use crate::error::{AttendanceError, Result};
use image::{ImageFormat, Luma};
use qrcode::QrCode;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The directory, relative to the static asset root, that QR codes are written to.
pub const QR_CODE_DIR: &str = "qr_codes";

/// Renders check-in URLs as QR code images under the static asset root.
#[derive(Debug, Clone)]
pub struct CodeIssuer {
    base_url: String,
    static_dir: PathBuf,
}

impl CodeIssuer {
    pub fn new(base_url: &str, static_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            static_dir: static_dir.into(),
        }
    }

    /// The URL a student's QR code encodes.
    pub fn check_in_url(&self, roll_number: &str) -> String {
        format!("{}/check_in/{}", self.base_url, roll_number)
    }

    /// The path of a student's QR code, relative to the static asset root.
    pub fn relative_path(roll_number: &str) -> String {
        format!("{QR_CODE_DIR}/{roll_number}.png")
    }

    /// Writes the QR code for `roll_number`, replacing any previous image for that roll number,
    /// and returns its path relative to the static asset root.
    pub fn issue(&self, roll_number: &str) -> Result<String> {
        validate_roll_number(roll_number)?;

        let url = self.check_in_url(roll_number);
        let png = render_png(&url)?;

        let dir = self.static_dir.join(QR_CODE_DIR);
        fs::create_dir_all(&dir)?;

        let relative = Self::relative_path(roll_number);
        fs::write(self.static_dir.join(&relative), png)?;
        debug!(%url, path = %relative, "issued QR code");

        Ok(relative)
    }

    /// Reads back a previously issued image given its path relative to the static asset root.
    pub fn read(&self, relative: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.static_dir.join(relative))?)
    }

    pub fn static_dir(&self) -> &Path {
        &self.static_dir
    }
}

/// Roll numbers become both a URL path segment and a file name, so they are restricted to
/// characters that are safe in both.
pub fn validate_roll_number(roll_number: &str) -> Result<()> {
    let valid = !roll_number.is_empty()
        && !roll_number.starts_with('.')
        && roll_number
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(AttendanceError::InvalidInput(format!(
            "roll number `{roll_number}` may only contain letters, digits, '-', '_' and '.'"
        )))
    }
}

fn render_png(data: &str) -> Result<Vec<u8>> {
    let code = QrCode::new(data.as_bytes())?;
    let image = code.render::<Luma<u8>>().min_dimensions(200, 200).build();

    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

    #[test]
    fn check_in_url_is_templated_with_roll_number() {
        let issuer = CodeIssuer::new("http://school.example/", "static");
        assert_eq!(
            issuer.check_in_url("R1"),
            "http://school.example/check_in/R1"
        );
    }

    #[test]
    fn issue_creates_directory_and_png() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = CodeIssuer::new("http://localhost:5000", dir.path().join("static"));

        let relative = issuer.issue("R1").unwrap();

        assert_eq!(relative, "qr_codes/R1.png");
        let png = issuer.read(&relative).unwrap();
        assert!(png.starts_with(PNG_MAGIC));
    }

    #[test]
    fn reissuing_overwrites_the_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = CodeIssuer::new("http://localhost:5000", dir.path());

        let first = issuer.issue("R1").unwrap();
        let second = issuer.issue("R1").unwrap();

        assert_eq!(first, second);
        let entries = fs::read_dir(dir.path().join(QR_CODE_DIR)).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn unsafe_roll_numbers_are_rejected() {
        for roll in ["", "../R1", "a/b", ".hidden", "R 1"] {
            assert!(
                matches!(
                    validate_roll_number(roll),
                    Err(AttendanceError::InvalidInput(_))
                ),
                "{roll:?} should be rejected"
            );
        }
        validate_roll_number("2024-10A_07").unwrap();
    }
}
