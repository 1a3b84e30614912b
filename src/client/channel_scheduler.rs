// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Arbitrates the radio's single channel between on-channel operation and bounded
//! off-channel excursions. The scheduler is the sole authority over `set_channel`;
//! components observe transitions through a [`ChannelListener`] passed into every call.

use {
    super::{Context, TimedEvent},
    crate::{
        device::{Channel, Device, RxInfo},
        error::Error,
        time::Time,
        timer::EventId,
    },
    std::{collections::VecDeque, time::Duration},
};

/// A bounded excursion away from the main channel. Consumed exactly once; the
/// listener may hand back a replacement when the budget expires (chaining).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffChannelRequest {
    pub channel: Channel,
    pub duration: Duration,
}

pub trait ChannelListener<D: Device> {
    /// About to leave the main channel. Gives the listener a chance to pause
    /// on-channel work, e.g. announce power save to the AP.
    fn pre_switch_off_channel(&mut self, ctx: &mut Context<D>);
    /// An off-channel window is starting, either fresh or chained.
    fn begin_off_channel_time(&mut self, ctx: &mut Context<D>);
    fn handle_off_channel_frame(&mut self, ctx: &mut Context<D>, frame: &[u8], rx_info: RxInfo);
    /// The current off-channel window ended. `interrupted` is true when it was cut
    /// short by `ensure_on_channel`. A returned replacement request is served
    /// immediately without an intermediate switch to the main channel; it is
    /// discarded when the window was interrupted.
    fn end_off_channel_time(
        &mut self,
        ctx: &mut Context<D>,
        interrupted: bool,
    ) -> Option<OffChannelRequest>;
    fn returned_on_channel(&mut self, ctx: &mut Context<D>);
    fn handle_on_channel_frame(&mut self, ctx: &mut Context<D>, frame: &[u8], rx_info: RxInfo);
}

#[derive(Debug, PartialEq)]
enum State {
    OnChannel,
    OffChannel,
}

pub struct ChannelScheduler {
    main_channel: Channel,
    state: State,
    queue: VecDeque<OffChannelRequest>,
    ensure_until: Option<Time>,
    timeout: Option<EventId>,
}

impl ChannelScheduler {
    pub fn new(main_channel: Channel) -> Self {
        ChannelScheduler {
            main_channel,
            state: State::OnChannel,
            queue: VecDeque::new(),
            ensure_until: None,
            timeout: None,
        }
    }

    pub fn main_channel(&self) -> Channel {
        self.main_channel
    }

    pub fn on_main_channel(&self) -> bool {
        self.state == State::OnChannel
    }

    /// Updates the main channel. Takes effect immediately when on-channel,
    /// otherwise when the scheduler next returns on-channel.
    pub fn set_channel<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        channel: Channel,
    ) -> Result<(), Error> {
        self.main_channel = channel;
        if self.on_main_channel() {
            ctx.device.set_channel(channel)?;
        }
        Ok(())
    }

    /// Serves the request immediately when on-channel and outside any on-channel
    /// guarantee window; queues it otherwise.
    pub fn request_off_channel_time<D: Device, L: ChannelListener<D>>(
        &mut self,
        ctx: &mut Context<D>,
        listener: &mut L,
        req: OffChannelRequest,
    ) -> Result<(), Error> {
        if self.on_main_channel() && !self.in_ensure_window(ctx.timer.now()) {
            self.serve(ctx, listener, req, true)
        } else {
            self.queue.push_back(req);
            if self.on_main_channel() {
                // Off-channel already ends through its own timeout; only an
                // ensure window needs an explicit flush deadline.
                self.schedule_ensure_flush(ctx)?;
            }
            Ok(())
        }
    }

    /// Forcibly truncates any active off-channel window and blocks new excursions
    /// until `until`. Queued requests are served when the guarantee expires.
    pub fn ensure_on_channel<D: Device, L: ChannelListener<D>>(
        &mut self,
        ctx: &mut Context<D>,
        listener: &mut L,
        until: Time,
    ) -> Result<(), Error> {
        self.ensure_until = Some(until);
        if !self.on_main_channel() {
            self.cancel_timeout(ctx);
            // The interrupted window does not get to chain a replacement.
            let _ = listener.end_off_channel_time(ctx, true);
            self.return_on_channel(ctx, listener)?;
        }
        if !self.queue.is_empty() {
            self.schedule_ensure_flush(ctx)?;
        }
        Ok(())
    }

    /// Handles expiry of the current off-channel budget or of an on-channel
    /// guarantee with queued requests.
    pub fn handle_timeout<D: Device, L: ChannelListener<D>>(
        &mut self,
        ctx: &mut Context<D>,
        listener: &mut L,
    ) -> Result<(), Error> {
        self.timeout = None;
        match self.state {
            State::OffChannel => match listener.end_off_channel_time(ctx, false) {
                Some(next) => self.serve(ctx, listener, next, false),
                None => {
                    self.return_on_channel(ctx, listener)?;
                    self.serve_queued(ctx, listener)
                }
            },
            State::OnChannel => self.serve_queued(ctx, listener),
        }
    }

    pub fn handle_frame<D: Device, L: ChannelListener<D>>(
        &mut self,
        ctx: &mut Context<D>,
        listener: &mut L,
        frame: &[u8],
        rx_info: RxInfo,
    ) {
        match self.state {
            State::OnChannel => listener.handle_on_channel_frame(ctx, frame, rx_info),
            State::OffChannel => listener.handle_off_channel_frame(ctx, frame, rx_info),
        }
    }

    fn in_ensure_window(&self, now: Time) -> bool {
        self.ensure_until.map_or(false, |until| now < until)
    }

    fn serve<D: Device, L: ChannelListener<D>>(
        &mut self,
        ctx: &mut Context<D>,
        listener: &mut L,
        req: OffChannelRequest,
        leaving_main: bool,
    ) -> Result<(), Error> {
        if leaving_main {
            listener.pre_switch_off_channel(ctx);
        }
        listener.begin_off_channel_time(ctx);
        self.state = State::OffChannel;
        ctx.device.set_channel(req.channel)?;
        self.timeout = Some(ctx.timer.schedule_after(req.duration, TimedEvent::ChannelScheduler)?);
        Ok(())
    }

    fn serve_queued<D: Device, L: ChannelListener<D>>(
        &mut self,
        ctx: &mut Context<D>,
        listener: &mut L,
    ) -> Result<(), Error> {
        if self.in_ensure_window(ctx.timer.now()) {
            self.schedule_ensure_flush(ctx)?;
            return Ok(());
        }
        match self.queue.pop_front() {
            Some(req) => self.serve(ctx, listener, req, true),
            None => Ok(()),
        }
    }

    fn return_on_channel<D: Device, L: ChannelListener<D>>(
        &mut self,
        ctx: &mut Context<D>,
        listener: &mut L,
    ) -> Result<(), Error> {
        self.state = State::OnChannel;
        ctx.device.set_channel(self.main_channel)?;
        listener.returned_on_channel(ctx);
        Ok(())
    }

    fn schedule_ensure_flush<D: Device>(&mut self, ctx: &mut Context<D>) -> Result<(), Error> {
        if self.timeout.is_some() {
            return Ok(());
        }
        let deadline = match self.ensure_until {
            Some(until) => until,
            None => ctx.timer.now(),
        };
        self.timeout = Some(ctx.timer.schedule_event(deadline, TimedEvent::ChannelScheduler)?);
        Ok(())
    }

    fn cancel_timeout<D: Device>(&mut self, ctx: &mut Context<D>) {
        if let Some(id) = self.timeout.take() {
            ctx.timer.cancel_event(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            client::test_helpers,
            device::{Cbw, FakeDevice},
            test_utils::assert_variant,
            timer::FakeScheduler,
        },
    };

    const MAIN: Channel = Channel { primary: 11, cbw: Cbw::Cbw20 };
    const OFF: Channel = Channel { primary: 1, cbw: Cbw::Cbw20 };
    const OFF2: Channel = Channel { primary: 6, cbw: Cbw::Cbw20 };

    #[derive(Debug, PartialEq)]
    enum LEvent {
        PreSwitch,
        BeginOffChannel,
        OffChannelFrame(Vec<u8>),
        EndOffChannel { interrupted: bool },
        ReturnedOnChannel,
        OnChannelFrame(Vec<u8>),
    }

    struct MockListener {
        events: Vec<LEvent>,
        chain: Option<OffChannelRequest>,
    }

    impl MockListener {
        fn new() -> Self {
            MockListener { events: vec![], chain: None }
        }

        fn drain_events(&mut self) -> Vec<LEvent> {
            self.events.drain(..).collect()
        }
    }

    impl ChannelListener<FakeDevice> for MockListener {
        fn pre_switch_off_channel(&mut self, _ctx: &mut Context<FakeDevice>) {
            self.events.push(LEvent::PreSwitch);
        }
        fn begin_off_channel_time(&mut self, _ctx: &mut Context<FakeDevice>) {
            self.events.push(LEvent::BeginOffChannel);
        }
        fn handle_off_channel_frame(
            &mut self,
            _ctx: &mut Context<FakeDevice>,
            frame: &[u8],
            _rx_info: RxInfo,
        ) {
            self.events.push(LEvent::OffChannelFrame(frame.to_vec()));
        }
        fn end_off_channel_time(
            &mut self,
            _ctx: &mut Context<FakeDevice>,
            interrupted: bool,
        ) -> Option<OffChannelRequest> {
            self.events.push(LEvent::EndOffChannel { interrupted });
            self.chain.take()
        }
        fn returned_on_channel(&mut self, _ctx: &mut Context<FakeDevice>) {
            self.events.push(LEvent::ReturnedOnChannel);
        }
        fn handle_on_channel_frame(
            &mut self,
            _ctx: &mut Context<FakeDevice>,
            frame: &[u8],
            _rx_info: RxInfo,
        ) {
            self.events.push(LEvent::OnChannelFrame(frame.to_vec()));
        }
    }

    struct MockObjects {
        ctx: Context<FakeDevice>,
        device: FakeDevice,
        scheduler: FakeScheduler,
        listener: MockListener,
    }

    impl MockObjects {
        fn new() -> Self {
            let (ctx, device, scheduler) = test_helpers::make_ctx();
            MockObjects { ctx, device, scheduler, listener: MockListener::new() }
        }
    }

    fn off_req(channel: Channel, millis: u64) -> OffChannelRequest {
        OffChannelRequest { channel, duration: Duration::from_millis(millis) }
    }

    #[test]
    fn serve_immediately_when_on_channel() {
        let mut m = MockObjects::new();
        let mut chan_sched = ChannelScheduler::new(MAIN);
        m.ctx.device.set_channel(MAIN).expect("set_channel");

        chan_sched
            .request_off_channel_time(&mut m.ctx, &mut m.listener, off_req(OFF, 50))
            .expect("request failed");
        assert_eq!(m.listener.drain_events(), vec![LEvent::PreSwitch, LEvent::BeginOffChannel]);
        assert_eq!(m.device.channel(), OFF);
        assert!(!chan_sched.on_main_channel());
        assert!(m.scheduler.armed().is_some());
    }

    #[test]
    fn timeout_returns_on_channel() {
        let mut m = MockObjects::new();
        let mut chan_sched = ChannelScheduler::new(MAIN);
        m.ctx.device.set_channel(MAIN).expect("set_channel");

        chan_sched
            .request_off_channel_time(&mut m.ctx, &mut m.listener, off_req(OFF, 50))
            .expect("request failed");
        m.listener.drain_events();

        m.scheduler.advance(Duration::from_millis(50));
        deliver_timeouts(&mut chan_sched, &mut m);
        assert_eq!(
            m.listener.drain_events(),
            vec![LEvent::EndOffChannel { interrupted: false }, LEvent::ReturnedOnChannel]
        );
        assert_eq!(m.device.channel(), MAIN);
        assert!(chan_sched.on_main_channel());
    }

    #[test]
    fn chained_request_skips_main_channel() {
        let mut m = MockObjects::new();
        let mut chan_sched = ChannelScheduler::new(MAIN);
        m.ctx.device.set_channel(MAIN).expect("set_channel");

        chan_sched
            .request_off_channel_time(&mut m.ctx, &mut m.listener, off_req(OFF, 50))
            .expect("request failed");
        m.listener.drain_events();

        m.listener.chain = Some(off_req(OFF2, 30));
        m.scheduler.advance(Duration::from_millis(50));
        deliver_timeouts(&mut chan_sched, &mut m);
        assert_eq!(
            m.listener.drain_events(),
            vec![LEvent::EndOffChannel { interrupted: false }, LEvent::BeginOffChannel]
        );
        assert_eq!(m.device.channel(), OFF2);
        assert!(!chan_sched.on_main_channel());

        // The chained window ends normally.
        m.scheduler.advance(Duration::from_millis(30));
        deliver_timeouts(&mut chan_sched, &mut m);
        assert_eq!(
            m.listener.drain_events(),
            vec![LEvent::EndOffChannel { interrupted: false }, LEvent::ReturnedOnChannel]
        );
        assert_eq!(m.device.channel(), MAIN);
    }

    #[test]
    fn ensure_on_channel_interrupts_off_channel() {
        let mut m = MockObjects::new();
        let mut chan_sched = ChannelScheduler::new(MAIN);
        m.ctx.device.set_channel(MAIN).expect("set_channel");

        chan_sched
            .request_off_channel_time(&mut m.ctx, &mut m.listener, off_req(OFF, 50))
            .expect("request failed");
        m.listener.drain_events();

        // A chained replacement is discarded on interruption.
        m.listener.chain = Some(off_req(OFF2, 30));
        let until = m.ctx.timer.now() + Duration::from_millis(100);
        chan_sched.ensure_on_channel(&mut m.ctx, &mut m.listener, until).expect("ensure failed");
        assert_eq!(
            m.listener.drain_events(),
            vec![LEvent::EndOffChannel { interrupted: true }, LEvent::ReturnedOnChannel]
        );
        assert_eq!(m.device.channel(), MAIN);
        assert!(chan_sched.on_main_channel());
    }

    #[test]
    fn requests_queued_during_ensure_window_and_flushed() {
        let mut m = MockObjects::new();
        let mut chan_sched = ChannelScheduler::new(MAIN);
        m.ctx.device.set_channel(MAIN).expect("set_channel");

        let until = m.ctx.timer.now() + Duration::from_millis(100);
        chan_sched.ensure_on_channel(&mut m.ctx, &mut m.listener, until).expect("ensure failed");
        chan_sched
            .request_off_channel_time(&mut m.ctx, &mut m.listener, off_req(OFF, 50))
            .expect("request failed");
        assert_eq!(m.listener.drain_events(), vec![]);
        assert_eq!(m.device.channel(), MAIN);

        m.scheduler.advance(Duration::from_millis(100));
        deliver_timeouts(&mut chan_sched, &mut m);
        assert_eq!(m.listener.drain_events(), vec![LEvent::PreSwitch, LEvent::BeginOffChannel]);
        assert_eq!(m.device.channel(), OFF);
    }

    #[test]
    fn requests_queued_while_off_channel_served_after_return() {
        let mut m = MockObjects::new();
        let mut chan_sched = ChannelScheduler::new(MAIN);
        m.ctx.device.set_channel(MAIN).expect("set_channel");

        chan_sched
            .request_off_channel_time(&mut m.ctx, &mut m.listener, off_req(OFF, 50))
            .expect("request failed");
        chan_sched
            .request_off_channel_time(&mut m.ctx, &mut m.listener, off_req(OFF2, 30))
            .expect("request failed");
        m.listener.drain_events();
        assert_eq!(m.device.channel(), OFF);

        m.scheduler.advance(Duration::from_millis(50));
        deliver_timeouts(&mut chan_sched, &mut m);
        assert_eq!(
            m.listener.drain_events(),
            vec![
                LEvent::EndOffChannel { interrupted: false },
                LEvent::ReturnedOnChannel,
                LEvent::PreSwitch,
                LEvent::BeginOffChannel,
            ]
        );
        assert_eq!(m.device.channel(), OFF2);
    }

    #[test]
    fn set_channel_deferred_while_off_channel() {
        let mut m = MockObjects::new();
        let mut chan_sched = ChannelScheduler::new(MAIN);
        m.ctx.device.set_channel(MAIN).expect("set_channel");

        chan_sched
            .request_off_channel_time(&mut m.ctx, &mut m.listener, off_req(OFF, 50))
            .expect("request failed");
        m.listener.drain_events();

        let new_main = Channel::new(36, Cbw::Cbw40);
        chan_sched.set_channel(&mut m.ctx, new_main).expect("set_channel failed");
        assert_eq!(m.device.channel(), OFF);

        m.scheduler.advance(Duration::from_millis(50));
        deliver_timeouts(&mut chan_sched, &mut m);
        assert_eq!(m.device.channel(), new_main);
    }

    #[test]
    fn frames_dispatched_by_state() {
        let mut m = MockObjects::new();
        let mut chan_sched = ChannelScheduler::new(MAIN);
        let rx_info = RxInfo { channel: MAIN, rssi_dbm: -40, snr_db: 30 };

        chan_sched.handle_frame(&mut m.ctx, &mut m.listener, &[1], rx_info);
        chan_sched
            .request_off_channel_time(&mut m.ctx, &mut m.listener, off_req(OFF, 50))
            .expect("request failed");
        chan_sched.handle_frame(&mut m.ctx, &mut m.listener, &[2], rx_info);

        let events = m.listener.drain_events();
        assert_variant!(&events[0], LEvent::OnChannelFrame(frame) => assert_eq!(frame, &[1]));
        assert_variant!(&events[3], LEvent::OffChannelFrame(frame) => assert_eq!(frame, &[2]));
    }

    fn deliver_timeouts(chan_sched: &mut ChannelScheduler, m: &mut MockObjects) {
        let now = m.ctx.timer.now();
        while let Some((_id, event)) = m.ctx.timer.next_due(now) {
            match event {
                TimedEvent::ChannelScheduler => chan_sched
                    .handle_timeout(&mut m.ctx, &mut m.listener)
                    .expect("handle_timeout failed"),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }
}
