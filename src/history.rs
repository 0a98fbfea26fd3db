/// Past states of a component, with a cursor.
///
/// Recording appends. Moving the cursor never records.
#[derive(Debug, Clone)]
pub struct History<T> {
	entries: Vec<T>,
	index: usize,
}

impl<T> Default for History<T> {
	fn default() -> Self {
		Self { entries: Vec::new(), index: 0 }
	}
}

impl<T: Clone> History<T> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends `entry` and moves the cursor onto it.
	pub fn record(&mut self, entry: T) {
		self.entries.push(entry);
		self.index = self.entries.len() - 1;
	}

	/// Steps back. Returns [`None`] at the oldest entry, leaving the cursor in place.
	pub fn prev(&mut self) -> Option<T> {
		if self.index == 0 {
			return None;
		}
		self.index -= 1;
		self.entries.get(self.index).cloned()
	}

	/// Steps forward. Returns [`None`] at the newest entry, leaving the cursor in place.
	pub fn next(&mut self) -> Option<T> {
		if self.index + 1 >= self.entries.len() {
			return None;
		}
		self.index += 1;
		self.entries.get(self.index).cloned()
	}

	#[must_use]
	pub fn current(&self) -> Option<&T> {
		self.entries.get(self.index)
	}

	#[must_use]
	pub fn index(&self) -> usize {
		self.index
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::History;

	#[test]
	fn navigation_clamps_and_does_not_record() {
		let mut history = History::new();
		assert_eq!(history.prev(), None);
		for state in 1..=3 {
			history.record(state);
		}
		assert_eq!(history.next(), None);
		assert_eq!(history.prev(), Some(2));
		assert_eq!(history.prev(), Some(1));
		assert_eq!(history.prev(), None);
		assert_eq!(history.current(), Some(&1));
		assert_eq!(history.next(), Some(2));
		assert_eq!(history.len(), 3);

		history.record(4);
		assert_eq!(history.index(), 3);
		assert_eq!(history.prev(), Some(3));
	}
}
