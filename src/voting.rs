//! The voting service: every business operation, with time taken from an
//! injected clock and state kept in a [`VotingStore`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::error::{Error, Result, VotingError};
use crate::model::{
    api::{CandidacyRequest, LoginRequest, ProfileRequest, RegisterRequest, UpdatedFields},
    common::{Clock, VotingDay, VotingStatus, VotingWindow},
    db::{Candidate, NewVote, NewVoter, ProfileUpdate, Vote, Voter},
    mongodb::Id,
    results::DayResults,
};
use crate::store::{Stats, VotingStore};

/// What happened when a voter applied to stand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidacyOutcome {
    pub candidate: Candidate,
    /// True if an earlier, revoked candidacy was brought back rather than a
    /// new one created.
    pub reactivated: bool,
}

/// Shared service state, managed by Rocket.
pub struct Voting {
    store: Arc<dyn VotingStore>,
    clock: Arc<dyn Clock>,
    window: VotingWindow,
}

impl Voting {
    pub fn new(store: Arc<dyn VotingStore>, clock: Arc<dyn Clock>, window: VotingWindow) -> Self {
        Self {
            store,
            clock,
            window,
        }
    }

    pub fn window(&self) -> VotingWindow {
        self.window
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The voting day as of now.
    pub fn today(&self) -> VotingDay {
        self.window.voting_day(self.now())
    }

    /// Create a voter account.
    pub async fn register(&self, request: RegisterRequest) -> Result<Voter> {
        let voter: NewVoter = request.try_into()?;
        let voter = self.store.insert_voter(voter).await?;
        info!("Registered voter {}", voter.id);
        Ok(voter)
    }

    /// Check a voter's credentials.
    pub async fn login(&self, request: LoginRequest) -> Result<Voter> {
        let email = request.email.trim().to_lowercase();
        let voter = self
            .store
            .voter_by_email(&email)
            .await?
            .ok_or(VotingError::UserNotFound)?;
        if !voter.verify_password(&request.password) {
            debug!("Wrong password for voter {}", voter.id);
            return Err(VotingError::InvalidCredentials.into());
        }
        Ok(voter)
    }

    pub async fn voter(&self, id: Id) -> Result<Option<Voter>> {
        self.store.voter_by_id(id).await
    }

    /// Change the voter's own name, date of birth or gender. Fields left out
    /// of the request keep their value.
    pub async fn update_profile(
        &self,
        voter_id: Id,
        request: ProfileRequest,
    ) -> Result<(Voter, UpdatedFields)> {
        let update: ProfileUpdate = request.try_into()?;
        let updated = UpdatedFields::from(&update);
        let voter = self
            .store
            .update_voter(voter_id, update)
            .await?
            .ok_or_else(|| Error::not_found(format!("Voter {voter_id}")))?;
        debug!("Voter {voter_id} updated their profile: {updated:?}");
        Ok((voter, updated))
    }

    /// The voting window as of now.
    pub fn voting_status(&self) -> VotingStatus {
        self.window.status(self.now())
    }

    /// Cast a vote on the current voting day.
    ///
    /// Fails, in order of precedence, with `VotingClosed`, `AlreadyVoted`,
    /// `CandidateNotFound` or `CandidateInactive`.
    pub async fn cast_vote(&self, voter_id: Id, candidate_id: Id) -> Result<Vote> {
        let now = self.now();
        if !self.window.is_open(now) {
            return Err(VotingError::VotingClosed.into());
        }
        let vote = NewVote {
            voter_id,
            candidate_id,
            day: self.window.voting_day(now),
            cast_at: now,
        };
        let vote = self.store.insert_vote(vote).await?;
        info!(
            "Voter {} voted for candidate {} on {}",
            vote.voter_id, vote.candidate_id, vote.day
        );
        Ok(vote)
    }

    pub async fn has_voted_today(&self, voter_id: Id) -> Result<bool> {
        let vote = self.store.vote_by_voter(voter_id, self.today()).await?;
        Ok(vote.is_some())
    }

    /// Today's vote by this voter, with its candidate if that still exists.
    pub async fn my_vote(&self, voter_id: Id) -> Result<Option<(Vote, Option<Candidate>)>> {
        let Some(vote) = self.store.vote_by_voter(voter_id, self.today()).await? else {
            return Ok(None);
        };
        let candidate = self.store.candidate_by_id(vote.candidate_id).await?;
        Ok(Some((vote, candidate)))
    }

    /// Results for the given day, defaulting to today. The winner is only
    /// reported once the day is finalized.
    pub async fn results(&self, day: Option<VotingDay>) -> Result<DayResults> {
        let now = self.now();
        let day = day.unwrap_or_else(|| self.window.voting_day(now));
        let all = self.store.tally(day).await?;
        let finalized = self.window.is_finalized_for(day, now);
        Ok(DayResults::new(day, &all, finalized))
    }

    /// Active candidates, sorted by name.
    pub async fn candidates(&self) -> Result<Vec<Candidate>> {
        self.store.active_candidates().await
    }

    /// Apply to stand. A voter with no candidacy gets a new one; a voter whose
    /// candidacy was revoked gets it back, with the supplied details applied.
    pub async fn apply_candidacy(
        &self,
        voter_id: Id,
        request: CandidacyRequest,
    ) -> Result<CandidacyOutcome> {
        match self.store.candidate_by_voter(voter_id).await? {
            Some(existing) if existing.active => Err(VotingError::AlreadyCandidate.into()),
            Some(_) => {
                let candidate = self
                    .store
                    .reactivate_candidate(voter_id, request.into_update())
                    .await
                    .map_err(|err| match err {
                        // Someone else got there first.
                        Error::Voting(VotingError::AlreadyActive) => {
                            VotingError::AlreadyCandidate.into()
                        }
                        err => err,
                    })?;
                info!("Voter {voter_id} reactivated candidacy {}", candidate.id);
                Ok(CandidacyOutcome {
                    candidate,
                    reactivated: true,
                })
            }
            None => {
                let candidate = request.into_new_candidate(voter_id, self.now())?;
                let candidate = self.store.insert_candidate(candidate).await?;
                info!("Voter {voter_id} became candidate {}", candidate.id);
                Ok(CandidacyOutcome {
                    candidate,
                    reactivated: false,
                })
            }
        }
    }

    /// Withdraw from standing. Every vote ever cast for the candidate is
    /// discarded, on every day.
    pub async fn revoke_candidacy(&self, voter_id: Id) -> Result<()> {
        let purged = self.store.revoke_candidate(voter_id).await?;
        info!("Voter {voter_id} revoked their candidacy, {purged} votes purged");
        Ok(())
    }

    /// The voter's own candidacy, active or not, with today's vote count.
    pub async fn candidate_status(&self, voter_id: Id) -> Result<Option<(Candidate, u64)>> {
        let Some(candidate) = self.store.candidate_by_voter(voter_id).await? else {
            return Ok(None);
        };
        let votes = self
            .store
            .candidate_votes(candidate.id, self.today())
            .await?;
        Ok(Some((candidate, votes)))
    }

    /// Today's vote count for the voter's own candidacy.
    pub async fn my_vote_count(&self, voter_id: Id) -> Result<u64> {
        let candidate = self
            .store
            .candidate_by_voter(voter_id)
            .await?
            .ok_or(VotingError::NotCandidate)?;
        self.store.candidate_votes(candidate.id, self.today()).await
    }

    pub async fn stats(&self) -> Result<Stats> {
        self.store.stats().await
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rocket::futures::future::{join, join_all};

    use super::*;
    use crate::model::{common::FixedClock, db::CandidateCore};
    use crate::store::MemoryStore;

    struct Fixture {
        voting: Voting,
        store: MemoryStore,
        clock: FixedClock,
        window: VotingWindow,
    }

    impl Fixture {
        /// A service whose clock reads the given local time on 2026-10-17.
        fn at(hour: u32, minute: u32) -> Self {
            let window = VotingWindow::default();
            let clock = FixedClock::new(window.at(2026, 10, 17, hour, minute));
            let store = MemoryStore::new();
            let voting = Voting::new(
                Arc::new(store.clone()),
                Arc::new(clock.clone()),
                window,
            );
            Self {
                voting,
                store,
                clock,
                window,
            }
        }

        fn set_time(&self, day: u32, hour: u32, minute: u32) {
            self.clock.set(self.window.at(2026, 10, day, hour, minute));
        }

        async fn seed(&self, name: &str) -> Candidate {
            self.store
                .insert_candidate(CandidateCore::named(name))
                .await
                .unwrap()
        }

        async fn votes_for(&self, candidate: &Candidate, count: usize) {
            for _ in 0..count {
                self.voting
                    .cast_vote(Id::new(), candidate.id)
                    .await
                    .unwrap();
            }
        }
    }

    fn voting_error<T: std::fmt::Debug>(result: Result<T>) -> VotingError {
        match result {
            Err(Error::Voting(err)) => err,
            other => panic!("expected a voting error, got {other:?}"),
        }
    }

    #[rocket::async_test]
    async fn votes_only_count_inside_the_window() {
        let fixture = Fixture::at(7, 59);
        let alice = fixture.seed("Alice").await;
        let voter = Id::new();

        let err = voting_error(fixture.voting.cast_vote(voter, alice.id).await);
        assert_eq!(err, VotingError::VotingClosed);

        fixture.set_time(17, 8, 0);
        fixture.voting.cast_vote(voter, alice.id).await.unwrap();

        fixture.set_time(17, 20, 0);
        let err = voting_error(fixture.voting.cast_vote(Id::new(), alice.id).await);
        assert_eq!(err, VotingError::VotingClosed);
    }

    #[rocket::async_test]
    async fn one_vote_per_voter_per_day() {
        let fixture = Fixture::at(12, 0);
        let alice = fixture.seed("Alice").await;
        let bob = fixture.seed("Bob").await;
        let voter = Id::new();

        let vote = fixture.voting.cast_vote(voter, alice.id).await.unwrap();
        assert_eq!(vote.day.to_string(), "2026-10-17");
        let err = voting_error(fixture.voting.cast_vote(voter, bob.id).await);
        assert_eq!(err, VotingError::AlreadyVoted);
        assert_eq!(fixture.voting.stats().await.unwrap().total_votes, 1);
        assert!(fixture.voting.has_voted_today(voter).await.unwrap());

        // A new day brings a new vote.
        fixture.set_time(18, 9, 0);
        assert!(!fixture.voting.has_voted_today(voter).await.unwrap());
        fixture.voting.cast_vote(voter, bob.id).await.unwrap();
        assert_eq!(fixture.voting.stats().await.unwrap().total_votes, 2);
    }

    #[rocket::async_test]
    async fn voting_day_follows_the_regional_offset() {
        // 23:30 UTC on the 16th is already 05:00 on the 17th in UTC+05:30.
        let fixture = Fixture::at(5, 0);
        assert_eq!(fixture.voting.today().to_string(), "2026-10-17");
        assert!(!fixture.voting.voting_status().is_open);
    }

    #[rocket::async_test]
    async fn votes_for_missing_or_withdrawn_candidates_are_refused() {
        let fixture = Fixture::at(10, 0);
        let mut ghost = CandidateCore::named("Ghost");
        ghost.active = false;
        let ghost = fixture.store.insert_candidate(ghost).await.unwrap();

        let err = voting_error(fixture.voting.cast_vote(Id::new(), Id::new()).await);
        assert_eq!(err, VotingError::CandidateNotFound);
        let err = voting_error(fixture.voting.cast_vote(Id::new(), ghost.id).await);
        assert_eq!(err, VotingError::CandidateInactive);
        assert_eq!(fixture.voting.stats().await.unwrap().total_votes, 0);
    }

    #[rocket::async_test]
    async fn tie_is_broken_alphabetically_once_final() {
        let fixture = Fixture::at(9, 0);
        let bob = fixture.seed("Bob").await;
        let alice = fixture.seed("Alice").await;
        let carl = fixture.seed("Carl").await;
        fixture.votes_for(&bob, 3).await;
        fixture.votes_for(&alice, 3).await;
        fixture.votes_for(&carl, 1).await;

        let open = fixture.voting.results(None).await.unwrap();
        assert!(!open.is_finalized);
        assert!(open.winner.is_none());
        assert_eq!(open.total_votes, 7);

        fixture.set_time(17, 21, 0);
        let results = fixture.voting.results(None).await.unwrap();
        assert!(results.is_finalized);
        let winner = results.winner.unwrap();
        assert_eq!(winner.name, "Alice");
        assert_eq!(winner.vote_count, 3);
        assert!(results.tie_broken);
        assert_eq!(results.tied_candidates, vec!["Alice", "Bob"]);
    }

    #[rocket::async_test]
    async fn past_days_are_final_and_future_days_are_not() {
        let fixture = Fixture::at(12, 0);
        let alice = fixture.seed("Alice").await;
        fixture.votes_for(&alice, 2).await;

        let yesterday = VotingDay::new(NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());
        let tomorrow = VotingDay::new(NaiveDate::from_ymd_opt(2026, 10, 18).unwrap());
        let past = fixture.voting.results(Some(yesterday)).await.unwrap();
        assert!(past.is_finalized);
        assert_eq!(past.total_votes, 0);
        assert!(!fixture
            .voting
            .results(Some(tomorrow))
            .await
            .unwrap()
            .is_finalized);
    }

    #[rocket::async_test]
    async fn revocation_purges_votes_on_every_day() {
        let fixture = Fixture::at(10, 0);
        let owner = Id::new();
        let alice = fixture
            .voting
            .apply_candidacy(owner, CandidacyRequest::example())
            .await
            .unwrap()
            .candidate;
        fixture.votes_for(&alice, 2).await;
        fixture.set_time(18, 10, 0);
        fixture.votes_for(&alice, 1).await;

        fixture.voting.revoke_candidacy(owner).await.unwrap();

        let day_one = VotingDay::new(NaiveDate::from_ymd_opt(2026, 10, 17).unwrap());
        for day in [Some(day_one), None] {
            let results = fixture.voting.results(day).await.unwrap();
            assert!(results.results.is_empty());
            assert_eq!(results.total_votes, 0);
            assert!(!results.previous_winner_revoked);
        }
        assert_eq!(fixture.voting.stats().await.unwrap().total_votes, 0);
        assert!(fixture.voting.candidates().await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn reapplying_restores_the_same_candidacy() {
        let fixture = Fixture::at(10, 0);
        let owner = Id::new();
        let first = fixture
            .voting
            .apply_candidacy(owner, CandidacyRequest::example())
            .await
            .unwrap();
        assert!(!first.reactivated);
        fixture.votes_for(&first.candidate, 2).await;
        fixture.voting.revoke_candidacy(owner).await.unwrap();

        // Only the supplied fields change on reactivation.
        let update = CandidacyRequest {
            party: Some("Green".to_string()),
            ..Default::default()
        };
        let second = fixture
            .voting
            .apply_candidacy(owner, update)
            .await
            .unwrap();
        assert!(second.reactivated);
        assert_eq!(second.candidate.id, first.candidate.id);
        assert!(second.candidate.active);
        assert_eq!(second.candidate.party, "Green");
        assert_eq!(second.candidate.name, first.candidate.name);

        assert_eq!(fixture.voting.my_vote_count(owner).await.unwrap(), 0);
        let candidates = fixture.voting.candidates().await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, first.candidate.id);
    }

    #[rocket::async_test]
    async fn candidacy_lifecycle_errors() {
        let fixture = Fixture::at(10, 0);
        let owner = Id::new();

        let err = voting_error(fixture.voting.revoke_candidacy(owner).await);
        assert_eq!(err, VotingError::NotCandidate);
        let err = voting_error(fixture.voting.my_vote_count(owner).await);
        assert_eq!(err, VotingError::NotCandidate);

        let incomplete = CandidacyRequest {
            gender: None,
            ..CandidacyRequest::example()
        };
        let err = voting_error(fixture.voting.apply_candidacy(owner, incomplete).await);
        assert_eq!(err, VotingError::validation("Gender is required"));

        fixture
            .voting
            .apply_candidacy(owner, CandidacyRequest::example())
            .await
            .unwrap();
        let err = voting_error(
            fixture
                .voting
                .apply_candidacy(owner, CandidacyRequest::example())
                .await,
        );
        assert_eq!(err, VotingError::AlreadyCandidate);

        fixture.voting.revoke_candidacy(owner).await.unwrap();
        let err = voting_error(fixture.voting.revoke_candidacy(owner).await);
        assert_eq!(err, VotingError::AlreadyInactive);
    }

    #[rocket::async_test]
    async fn own_candidacy_shows_todays_count() {
        let fixture = Fixture::at(10, 0);
        let owner = Id::new();
        assert!(fixture.voting.candidate_status(owner).await.unwrap().is_none());

        let candidate = fixture
            .voting
            .apply_candidacy(owner, CandidacyRequest::example())
            .await
            .unwrap()
            .candidate;
        fixture.votes_for(&candidate, 2).await;

        let (own, votes) = fixture.voting.candidate_status(owner).await.unwrap().unwrap();
        assert_eq!(own.id, candidate.id);
        assert_eq!(votes, 2);

        fixture.set_time(18, 10, 0);
        assert_eq!(fixture.voting.my_vote_count(owner).await.unwrap(), 0);
    }

    #[rocket::async_test]
    async fn my_vote_names_the_candidate() {
        let fixture = Fixture::at(10, 0);
        let alice = fixture.seed("Alice").await;
        let voter = Id::new();
        assert!(fixture.voting.my_vote(voter).await.unwrap().is_none());

        fixture.voting.cast_vote(voter, alice.id).await.unwrap();
        let (vote, candidate) = fixture.voting.my_vote(voter).await.unwrap().unwrap();
        assert_eq!(vote.candidate_id, alice.id);
        assert_eq!(candidate.unwrap().name, "Alice");
    }

    #[rocket::async_test]
    async fn status_counts_whole_hours() {
        let fixture = Fixture::at(7, 30);
        let status = fixture.voting.voting_status();
        assert!(!status.is_open);
        assert_eq!(status.hours_until_open, Some(1));
        assert!(status.message.contains("Opens in: 1 hour"));

        fixture.set_time(17, 19, 30);
        let status = fixture.voting.voting_status();
        assert!(status.is_open);
        assert_eq!(status.hours_until_close, Some(1));
        assert!(status.message.contains("Time remaining: 1 hour"));
    }

    #[rocket::async_test]
    async fn register_and_login() {
        let fixture = Fixture::at(10, 0);
        let voter = fixture
            .voting
            .register(RegisterRequest::example())
            .await
            .unwrap();
        assert_eq!(voter.email, "alice@example.com");

        let err = voting_error(fixture.voting.register(RegisterRequest::example()).await);
        assert_eq!(err, VotingError::UserExists);

        let logged_in = fixture
            .voting
            .login(LoginRequest::example())
            .await
            .unwrap();
        assert_eq!(logged_in.id, voter.id);

        let wrong = LoginRequest {
            password: "not the password".to_string(),
            ..LoginRequest::example()
        };
        let err = voting_error(fixture.voting.login(wrong).await);
        assert_eq!(err, VotingError::InvalidCredentials);

        let unknown = LoginRequest {
            email: "nobody@example.com".to_string(),
            ..LoginRequest::example()
        };
        let err = voting_error(fixture.voting.login(unknown).await);
        assert_eq!(err, VotingError::UserNotFound);
    }

    #[rocket::async_test]
    async fn profile_update_is_partial() {
        let fixture = Fixture::at(10, 0);
        let voter = fixture
            .voting
            .register(RegisterRequest::example())
            .await
            .unwrap();

        let request = ProfileRequest {
            gender: Some("female".to_string()),
            dob: NaiveDate::from_ymd_opt(1990, 4, 1),
            ..Default::default()
        };
        let (updated, fields) = fixture
            .voting
            .update_profile(voter.id, request)
            .await
            .unwrap();
        assert_eq!(updated.name, "Alice Example");
        assert_eq!(updated.gender.as_deref(), Some("female"));
        assert!(!fields.name && fields.dob && fields.gender);

        let stored = fixture.voting.voter(voter.id).await.unwrap().unwrap();
        assert_eq!(stored.dob, NaiveDate::from_ymd_opt(1990, 4, 1));
        assert!(stored.verify_password(&RegisterRequest::example().password));

        let missing = fixture
            .voting
            .update_profile(Id::new(), ProfileRequest::default())
            .await;
        assert!(matches!(missing, Err(Error::Status(status, _)) if status.code == 404));
    }

    #[rocket::async_test]
    async fn simultaneous_ballots_from_one_voter_count_once() {
        let fixture = Fixture::at(12, 0);
        let alice = fixture.seed("Alice").await;
        let bob = fixture.seed("Bob").await;
        let voter = Id::new();

        let ballots = (0..16).map(|i| {
            let candidate = if i % 2 == 0 { alice.id } else { bob.id };
            fixture.voting.cast_vote(voter, candidate)
        });
        let outcomes = join_all(ballots).await;

        let accepted = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        assert_eq!(accepted, 1);
        for outcome in outcomes.into_iter().filter(Result::is_err) {
            assert_eq!(voting_error(outcome), VotingError::AlreadyVoted);
        }
        let results = fixture.voting.results(None).await.unwrap();
        assert_eq!(results.tally.values().sum::<u64>(), 1);
        assert_eq!(fixture.voting.stats().await.unwrap().total_votes, 1);
    }

    #[rocket::async_test]
    async fn revocation_racing_ballots_leaves_no_votes_behind() {
        let fixture = Fixture::at(12, 0);
        let owner = Id::new();
        let alice = fixture
            .voting
            .apply_candidacy(owner, CandidacyRequest::example())
            .await
            .unwrap()
            .candidate;
        fixture.votes_for(&alice, 3).await;

        let ballots = join_all((0..32).map(|_| fixture.voting.cast_vote(Id::new(), alice.id)));
        let (revoked, outcomes) = join(fixture.voting.revoke_candidacy(owner), ballots).await;
        revoked.unwrap();

        for outcome in outcomes.into_iter().filter(Result::is_err) {
            assert_eq!(voting_error(outcome), VotingError::CandidateInactive);
        }
        let today = fixture.voting.today();
        assert_eq!(fixture.store.candidate_votes(alice.id, today).await.unwrap(), 0);
        assert_eq!(fixture.voting.stats().await.unwrap().total_votes, 0);

        let err = voting_error(fixture.voting.cast_vote(Id::new(), alice.id).await);
        assert_eq!(err, VotingError::CandidateInactive);
    }
}
