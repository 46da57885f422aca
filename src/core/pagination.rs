/// One page of a larger result set.
///
/// Out-of-range pages are not an error: they come back empty, with
/// `has_prev` still pointing the reader home.
#[derive(Debug, Clone)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}

impl<T> Paginated<T> {
    pub fn paginate<I>(iter: I, page: usize, per_page: usize) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let start = (page - 1).saturating_mul(per_page);

        let mut total = 0;
        let mut items = Vec::new();
        for item in iter {
            if total >= start && items.len() < per_page {
                items.push(item);
            }
            total += 1;
        }

        Self {
            items,
            page,
            per_page,
            total,
        }
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page.saturating_mul(self.per_page) < self.total
    }

    /// Past the end, "previous" means the last page that has items.
    pub fn prev_num(&self) -> Option<usize> {
        self.has_prev()
            .then(|| (self.page - 1).min(self.pages().max(1)))
    }

    pub fn next_num(&self) -> Option<usize> {
        self.has_next().then(|| self.page + 1)
    }

    pub fn pages(&self) -> usize {
        self.total.div_ceil(self.per_page)
    }

    pub fn map<U, F>(self, f: F) -> Paginated<U>
    where
        F: FnMut(T) -> U,
    {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
        }
    }

    pub fn try_map<U, E, F>(self, f: F) -> Result<Paginated<U>, E>
    where
        F: FnMut(T) -> Result<U, E>,
    {
        Ok(Paginated {
            items: self.items.into_iter().map(f).collect::<Result<_, _>>()?,
            page: self.page,
            per_page: self.per_page,
            total: self.total,
        })
    }
}
