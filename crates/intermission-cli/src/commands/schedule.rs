use clap::Subcommand;
use intermission_core::Config;

use super::CliResult;

#[derive(Subcommand)]
pub enum ScheduleAction {
    /// Show the schedule the engine would run
    Show {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: ScheduleAction, config: &Config) -> CliResult {
    match action {
        ScheduleAction::Show { json } => {
            let schedule = config.schedule();
            if json {
                println!("{}", serde_json::to_string_pretty(&schedule)?);
                return Ok(());
            }
            let longest = schedule.longest_break_secs();
            let uniform = schedule.cycles.iter().all(|c| Some(c.break_length_secs) == longest);
            for (i, cycle) in schedule.cycles.iter().enumerate() {
                let marker = if !uniform && Some(cycle.break_length_secs) == longest {
                    "  (long)"
                } else {
                    ""
                };
                println!(
                    "{i:>3}  work {}  break {}{marker}",
                    clock_face(cycle.work_length_secs),
                    clock_face(cycle.break_length_secs),
                );
            }
            println!("total {}", clock_face(schedule.total_secs()));
        }
    }
    Ok(())
}

fn clock_face(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
