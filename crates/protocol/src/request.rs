use std::path::PathBuf;

use crate::operation::*;
use crate::{
    DocumentId, Metadata, Operation, OutlineEntry, Outcome, SecurityInfo, Statistics, StorageInfo,
    TextMatch,
};

/// Typed view of one operation: its argument struct and the payload a
/// successful response must carry.
pub trait Request: Into<Operation> + Send + 'static {
    /// Payload extracted from a successful outcome.
    type Response: Send + 'static;

    /// Extracts the typed payload, or `None` if the outcome has the wrong
    /// shape for this operation.
    fn response(outcome: Outcome) -> Option<Self::Response>;
}

macro_rules! impl_request {
    ($request:ty => $response:ty, $pattern:pat => $value:expr) => {
        impl Request for $request {
            type Response = $response;

            fn response(outcome: Outcome) -> Option<Self::Response> {
                match outcome {
                    $pattern => Some($value),
                    _ => None,
                }
            }
        }
    };
}

impl_request!(CreateDocument => DocumentId, Outcome::Created { document_id } => document_id);
impl_request!(OpenDocument => DocumentId, Outcome::Created { document_id } => document_id);
impl_request!(AddHeading => (), Outcome::Done => ());
impl_request!(AddParagraph => (), Outcome::Done => ());
impl_request!(AddTable => (), Outcome::Done => ());
impl_request!(AddList => (), Outcome::Done => ());
impl_request!(AddPageBreak => (), Outcome::Done => ());
impl_request!(SetHeader => (), Outcome::Done => ());
impl_request!(SetFooter => (), Outcome::Done => ());
impl_request!(FindAndReplace => usize, Outcome::Replaced { count } => count);
impl_request!(ExtractText => String, Outcome::Text { text } => text);
impl_request!(GetMetadata => Metadata, Outcome::Metadata { metadata } => metadata);
impl_request!(SaveDocument => (), Outcome::Done => ());
impl_request!(ConvertToPdf => (), Outcome::Done => ());
impl_request!(ConvertToImages => Vec<PathBuf>, Outcome::Images { paths } => paths);
impl_request!(CloseDocument => (), Outcome::Done => ());
impl_request!(ListDocuments => Vec<Metadata>, Outcome::Documents { documents } => documents);
impl_request!(SearchText => Vec<TextMatch>, Outcome::Matches { matches } => matches);
impl_request!(GetStatistics => Statistics, Outcome::Statistics { statistics } => statistics);
impl_request!(ExportToMarkdown => (), Outcome::Done => ());
impl_request!(GetDocumentStructure => Vec<OutlineEntry>, Outcome::Structure { outline } => outline);
impl_request!(GetSecurityInfo => SecurityInfo, Outcome::Security { security } => security);
impl_request!(GetStorageInfo => StorageInfo, Outcome::Storage { storage } => storage);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_outcome() {
        let count = FindAndReplace::response(Outcome::Replaced { count: 3 });
        assert_eq!(count, Some(3));
    }

    #[test]
    fn test_mismatched_outcome() {
        let text = ExtractText::response(Outcome::Done);
        assert_eq!(text, None);
    }
}
