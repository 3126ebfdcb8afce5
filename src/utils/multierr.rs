use std::error::Error;
use std::fmt;

/// Several independent failures reported as one.
#[derive(Debug, Clone)]
pub struct MultiError<E> {
    errors: Vec<E>,
}

impl<E> MultiError<E> {
    pub fn new(errors: Vec<E>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[E] {
        &self.errors
    }

    /// `None` when nothing failed, so callers can branch on the result.
    pub fn from_failures(errors: Vec<E>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self::new(errors))
        }
    }
}

impl<E: fmt::Display> fmt::Display for MultiError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure(s): ", self.errors.len())?;
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl<E: Error + 'static> Error for MultiError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.errors.first().map(|e| e as &dyn Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_from_failures_empty() {
        assert!(MultiError::<io::Error>::from_failures(Vec::new()).is_none());
    }

    #[test]
    fn test_display_joins_all() {
        let errs = MultiError::new(vec![
            io::Error::new(io::ErrorKind::Other, "first"),
            io::Error::new(io::ErrorKind::Other, "second"),
        ]);
        assert_eq!(errs.errors().len(), 2);
        assert_eq!(errs.to_string(), "2 failure(s): first; second");
        assert_eq!(errs.source().map(|e| e.to_string()), Some("first".to_string()));
    }
}
