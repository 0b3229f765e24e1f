/// Remote content identifier of a chapter.
pub type ChapterId = String;

/// One addressable unit of a work. `index` is the canonical position in
/// [`Work::chapters`] and the only key used for ordering output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub id: ChapterId,
    pub index: usize,
    pub display_title: String,
}

/// An entry of the chapter index as delivered by the index provider, before
/// indexes are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterEntry {
    pub id: ChapterId,
    pub display_title: String,
}

impl ChapterEntry {
    pub fn new(id: impl Into<ChapterId>, display_title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_title: display_title.into(),
        }
    }
}

/// The parent work. Immutable once built; chapter order is the document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Work {
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: String,
    chapters: Vec<Chapter>,
}

impl Work {
    /// Builds a work, assigning each chapter its position as `index`.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
        description: impl Into<String>,
        entries: Vec<ChapterEntry>,
    ) -> Self {
        let chapters = entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| Chapter {
                id: entry.id,
                index,
                display_title: entry.display_title,
            })
            .collect();
        Self {
            id: id.into(),
            title: title.into(),
            author: author.into(),
            description: description.into(),
            chapters,
        }
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn chapter(&self, index: usize) -> Option<&Chapter> {
        self.chapters.get(index)
    }
}

/// Outcome of fetching one chapter in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub chapter_index: usize,
    pub chapter_id: ChapterId,
    pub remote_title: Option<String>,
    pub paragraphs: Vec<String>,
    pub success: bool,
    /// Endpoint that produced the content, when one did.
    pub endpoint: Option<String>,
    /// The fetch was abandoned because the run was interrupted.
    pub cancelled: bool,
}

impl FetchResult {
    pub fn succeeded(
        chapter: &Chapter,
        endpoint: impl Into<String>,
        remote_title: Option<String>,
        paragraphs: Vec<String>,
    ) -> Self {
        Self {
            chapter_index: chapter.index,
            chapter_id: chapter.id.clone(),
            remote_title,
            paragraphs,
            success: true,
            endpoint: Some(endpoint.into()),
            cancelled: false,
        }
    }

    pub fn failed(chapter: &Chapter) -> Self {
        Self {
            chapter_index: chapter.index,
            chapter_id: chapter.id.clone(),
            remote_title: None,
            paragraphs: Vec::new(),
            success: false,
            endpoint: None,
            cancelled: false,
        }
    }

    pub fn cancelled(chapter: &Chapter) -> Self {
        Self {
            cancelled: true,
            ..Self::failed(chapter)
        }
    }
}
