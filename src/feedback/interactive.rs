// Bedside consultation loop
//
// Drives a FeedbackSession from a Console until the clinician stops.

use super::{ConsultationOutcome, FeedbackSession, Proposal, Review};
use crate::console::Console;
use crate::rl::policy::Policy;
use std::io::{BufRead, Write};

fn print_proposal<W: Write>(out: &mut W, proposal: &Proposal) -> std::io::Result<()> {
    writeln!(
        out,
        "Proposed induction dose rate: {:.2} mg/kg",
        proposal.action.induction_rate
    )?;
    writeln!(
        out,
        "Proposed maintenance infusion rate: {:.2} µg/kg/min",
        proposal.action.maintenance_rate
    )
}

fn print_outcome<W: Write>(out: &mut W, outcome: &ConsultationOutcome) -> std::io::Result<()> {
    writeln!(
        out,
        "Correct induction dose rate: {:.2} mg/kg",
        outcome.correct_doses.induction
    )?;
    writeln!(
        out,
        "Correct maintenance infusion rate: {:.2} µg/kg/min",
        outcome.correct_doses.maintenance
    )?;
    writeln!(
        out,
        "Final initial dose: {:.2} mg",
        outcome.final_doses.initial_dose_mg
    )?;
    writeln!(
        out,
        "Final maintenance dose: {:.2} mg/hr",
        outcome.final_doses.maintenance_dose_mg_per_hr
    )?;
    writeln!(
        out,
        "Total maintenance dose: {:.2} mg",
        outcome.final_doses.total_maintenance_dose_mg
    )?;
    writeln!(out, "Reward: {:.2}", outcome.reward)?;
    if outcome.fine_tune.is_some() {
        writeln!(out, "Policy updated with clinician feedback.")?;
    }
    Ok(())
}

/// Run consultations until the clinician declines to continue
///
/// Returns the number of consultations. Malformed input ends the session
/// with an error.
pub fn run_interactive<P, R, W>(
    session: &mut FeedbackSession<P>,
    console: &mut Console<R, W>,
) -> anyhow::Result<usize>
where
    P: Policy,
    R: BufRead,
    W: Write,
{
    let mut consultations = 0usize;

    loop {
        let input = console.read_patient()?;
        let proposal = session.propose(input)?;
        print_proposal(console.writer(), &proposal)?;

        let approved = console.read_yes_no("Are these doses correct? (yes/no): ", "approval")?;
        let review = if approved {
            Review::Approved
        } else {
            Review::Rejected(console.read_correction()?)
        };

        let outcome = session.review(&proposal, review)?;
        print_outcome(console.writer(), &outcome)?;
        consultations += 1;

        let more = console.read_yes_no(
            "Do you want to continue with another patient? (yes/no): ",
            "continuation",
        )?;
        if !more {
            break;
        }
    }

    Ok(consultations)
}
