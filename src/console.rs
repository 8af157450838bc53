// Console prompting for the bedside loop
//
// Line-oriented prompts over any BufRead/Write pair so the interactive loop
// can be driven from a terminal or from a scripted buffer.

use crate::rl::dosing::{PatientInput, TargetDoses};
use std::io::{BufRead, Write};

/// Errors raised while reading console input
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("invalid {field}: {input:?} is not a valid {expected}")]
    Parse {
        field: &'static str,
        input: String,
        expected: &'static str,
    },

    #[error("input closed while waiting for {0}")]
    UnexpectedEof(&'static str),

    #[error("console IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Prompting console over an input reader and an output writer
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Print `prompt` and read one trimmed line
    pub fn prompt_line(&mut self, prompt: &str, field: &'static str) -> Result<String, InputError> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(InputError::UnexpectedEof(field));
        }
        Ok(line.trim().to_string())
    }

    pub fn read_f64(&mut self, prompt: &str, field: &'static str) -> Result<f64, InputError> {
        let line = self.prompt_line(prompt, field)?;
        match line.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(InputError::Parse {
                field,
                input: line,
                expected: "number",
            }),
        }
    }

    pub fn read_u32(&mut self, prompt: &str, field: &'static str) -> Result<u32, InputError> {
        let line = self.prompt_line(prompt, field)?;
        line.parse::<u32>().map_err(|_| InputError::Parse {
            field,
            input: line,
            expected: "non-negative whole number",
        })
    }

    /// `yes` (any case) is affirmative; every other answer is not
    pub fn read_yes_no(&mut self, prompt: &str, field: &'static str) -> Result<bool, InputError> {
        let line = self.prompt_line(prompt, field)?;
        Ok(line.to_lowercase() == "yes")
    }

    pub fn read_patient(&mut self) -> Result<PatientInput, InputError> {
        let weight_kg = self.read_f64("Enter the patient's weight (kg): ", "weight")?;
        let duration_hr = self.read_f64("Enter the operation duration (hours): ", "duration")?;
        let age_years = self.read_u32("Enter the patient's age: ", "age")?;
        Ok(PatientInput {
            weight_kg,
            duration_hr,
            age_years,
        })
    }

    pub fn read_correction(&mut self) -> Result<TargetDoses, InputError> {
        let induction = self.read_f64(
            "Enter the correct initial bolus dose (mg/kg): ",
            "corrected induction rate",
        )?;
        let maintenance = self.read_f64(
            "Enter the correct maintenance infusion rate (µg/kg/min): ",
            "corrected maintenance rate",
        )?;
        Ok(TargetDoses::new(induction, maintenance))
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.output
    }

    pub fn into_inner(self) -> (R, W) {
        (self.input, self.output)
    }
}
