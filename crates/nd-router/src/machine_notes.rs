//! String encodings of `nd_incident::HistoryNote` for the `incident_history`
//! table's `kind` column.

use nd_common::Phase;
use nd_incident::HistoryNote;

pub fn history_kind(note: &HistoryNote) -> &'static str {
    match note {
        HistoryNote::Acknowledgement(Phase::Start) => "acknowledgement-start",
        HistoryNote::Acknowledgement(Phase::End) => "acknowledgement-end",
        HistoryNote::Downtime(Phase::Start) => "downtime-start",
        HistoryNote::Downtime(Phase::End) => "downtime-end",
        HistoryNote::Flapping(Phase::Start) => "flapping-start",
        HistoryNote::Flapping(Phase::End) => "flapping-end",
        HistoryNote::Mute => "mute",
        HistoryNote::Unmute => "unmute",
    }
}
