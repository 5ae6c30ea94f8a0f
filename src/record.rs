use thiserror::Error;

pub const PROFILE_FIELDS: usize = 4;
pub const MOVEMENT_FIELDS: usize = 24;
pub const MIN_FIELDS: usize = PROFILE_FIELDS + MOVEMENT_FIELDS;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("uploaded file is not valid UTF-8 text")]
    Utf8,
    #[error("field {index} is not numeric: {value:?}")]
    NonNumeric { index: usize, value: String },
    #[error("uploaded file contains no data rows")]
    Empty,
    #[error("first row has {found} fields, at least 28 required")]
    InsufficientColumns { found: usize },
}

/// Static demographic attributes, the first four fields of a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileFeatures {
    pub age: f32,
    pub rem_sleep_pct: f32,
    pub deep_sleep_pct: f32,
    pub exercise_frequency: f32,
}

impl ProfileFeatures {
    pub fn to_vec(self) -> Vec<f32> {
        vec![
            self.age,
            self.rem_sleep_pct,
            self.deep_sleep_pct,
            self.exercise_frequency,
        ]
    }
}

/// One screening sample: profile features plus one movement reading per hour
/// of a day. Decoded from the first data row of an uploaded CSV file.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreeningRecord {
    pub profile: ProfileFeatures,
    pub movement: [f32; MOVEMENT_FIELDS],
}

impl ScreeningRecord {
    /// Decodes comma-separated numeric text. Blank lines and blank cells are
    /// skipped, a leading header line is tolerated, and any rows after the
    /// first data row are ignored.
    pub fn from_csv(data: &[u8]) -> Result<Self, RecordError> {
        let text = std::str::from_utf8(data).map_err(|_| RecordError::Utf8)?;

        let mut rows = text.lines().map(str::trim).filter(|line| !line.is_empty());
        let first = rows.next().ok_or(RecordError::Empty)?;

        let fields = match parse_row(first) {
            Ok(fields) => fields,
            Err(RecordError::NonNumeric { index: 0, .. }) => {
                let row = rows.next().ok_or(RecordError::Empty)?;
                parse_row(row)?
            }
            Err(e) => return Err(e),
        };

        Self::from_fields(&fields)
    }

    fn from_fields(fields: &[f32]) -> Result<Self, RecordError> {
        if fields.len() < MIN_FIELDS {
            return Err(RecordError::InsufficientColumns {
                found: fields.len(),
            });
        }

        let profile = ProfileFeatures {
            age: fields[0],
            rem_sleep_pct: fields[1],
            deep_sleep_pct: fields[2],
            exercise_frequency: fields[3],
        };
        let mut movement = [0.0_f32; MOVEMENT_FIELDS];
        movement.copy_from_slice(&fields[PROFILE_FIELDS..MIN_FIELDS]);

        Ok(Self { profile, movement })
    }
}

fn parse_row(line: &str) -> Result<Vec<f32>, RecordError> {
    line.split(',')
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .enumerate()
        .map(|(index, cell)| {
            cell.parse::<f32>().map_err(|_| RecordError::NonNumeric {
                index,
                value: cell.to_string(),
            })
        })
        .collect()
}
